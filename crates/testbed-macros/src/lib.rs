//! # testbed-macros
//!
//! 该 crate 提供 `harness_test` 属性宏：把普通的零参数函数改写为标准 `#[test]`，
//! 并让测试主体运行在 `testbed_core::lifecycle::Harness` 的 setup/teardown 钩子之间。
//! 宏的实现分为三个阶段：解析调用参数、校验目标函数签名以及生成包裹后的测试函数。

use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Expr, ExprLit, ItemFn, Lit, LitStr, Meta, Result as SynResult, ReturnType, parse_macro_input};

#[proc_macro_attribute]
/// 教案级说明：
/// - **意图（Why）**：测试作者只需标注 `#[harness_test]`，即可获得回收批处理、缓存清理、
///   身份复位与跳过指令检查，不必在每个测试里手写样板。
/// - **逻辑（How）**：先解析属性参数（见 `parse_class`），再由 `wrap_test` 校验签名并生成
///   `#[test]` 函数。任一阶段失败都会转化为编译期诊断。
/// - **契约（What）**：目标函数必须无参数、非 `async`、无泛型且返回 `()`；
///   测试类名缺省为所在模块路径，也可通过 `class = "..."` 显式指定。
/// - **权衡（Trade-offs）**：跳过的测试在 libtest 中仍显示为通过，只在标准错误中输出跳过原因。
pub fn harness_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let function = parse_macro_input!(item as ItemFn);

    match parse_class(attr).and_then(|class| wrap_test(class, function)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// 教案级说明：
/// - **意图**：读取可选的测试类名，供跳过指令按类匹配。
/// - **契约**：属性为空时返回 `None`；否则只接受 `class = "字符串"` 一种形式。
fn parse_class(attr: TokenStream) -> SynResult<Option<LitStr>> {
    if attr.is_empty() {
        return Ok(None);
    }

    let meta = syn::parse::<Meta>(attr)?;
    match meta {
        Meta::NameValue(pair) if pair.path.is_ident("class") => match pair.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(class),
                ..
            }) => {
                if class.value().is_empty() {
                    Err(syn::Error::new(class.span(), "class 不能为空字符串"))
                } else {
                    Ok(Some(class))
                }
            }
            other => Err(syn::Error::new(other.span(), "class 需为字符串字面量")),
        },
        other => Err(syn::Error::new(
            other.span(),
            "harness_test 属性仅支持 class = \"...\"",
        )),
    }
}

/// 教案级说明：
/// - **意图**：把原函数体移入闭包，交给 `Harness::run_test` 执行。
/// - **逻辑**：
///   1. 校验签名，拒绝参数、`async`、泛型与非 `()` 返回值；
///   2. 保留原函数的属性与可见性，追加 `#[test]`；
///   3. 生成对默认 `Harness` 的调用，跳过时把原因写到标准错误。
/// - **契约**：函数体中的 `return` 仅结束闭包，语义与原函数一致。
fn wrap_test(class: Option<LitStr>, function: ItemFn) -> SynResult<proc_macro2::TokenStream> {
    let signature = &function.sig;
    if let Some(asyncness) = &signature.asyncness {
        return Err(syn::Error::new(asyncness.span(), "harness_test 不支持 async 函数"));
    }
    if !signature.inputs.is_empty() {
        return Err(syn::Error::new(
            signature.inputs.span(),
            "harness_test 目标函数不能带参数",
        ));
    }
    if !signature.generics.params.is_empty() {
        return Err(syn::Error::new(
            signature.generics.span(),
            "harness_test 目标函数不能带泛型",
        ));
    }
    if let ReturnType::Type(_, ty) = &signature.output {
        return Err(syn::Error::new(ty.span(), "harness_test 目标函数必须返回 ()"));
    }

    let attrs = &function.attrs;
    let vis = &function.vis;
    let ident = &signature.ident;
    let body = &function.block;
    let name = LitStr::new(&ident.to_string(), ident.span());
    let class = match class {
        Some(class) => quote! { #class },
        None => quote! { ::core::module_path!() },
    };

    Ok(quote! {
        #(#attrs)*
        #[test]
        #vis fn #ident() {
            let outcome = ::testbed_core::lifecycle::Harness::global().run_test(#class, #name, || #body);
            if let ::testbed_core::lifecycle::TestOutcome::Skipped { reason } = outcome {
                ::std::eprintln!("skipped {}: {}", #name, reason);
            }
        }
    })
}
