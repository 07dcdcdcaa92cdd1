//! 集成示例：演示测试作者如何以 `#[harness_test]` 把测试接入生命周期钩子。
//!
//! # 使用说明
//! - 标注后的函数会展开为标准 `#[test]`，主体运行在默认 `Harness` 的 setup/teardown 之间；
//! - 测试类名缺省为模块路径，也可以通过 `class = "..."` 显式指定。

use testbed_core::model::Identity;
use testbed_core::overrides::set_current_identity;
use testbed_core::{Harness, TestOutcome, current_identity, current_test, harness_test};

#[harness_test]
fn body_sees_its_own_test_name() {
    let test = current_test().expect("running under the harness");
    assert_eq!(test.class(), module_path!());
    assert_eq!(test.name(), "body_sees_its_own_test_name");
}

#[harness_test(class = "HostTest")]
fn explicit_class_overrides_module_path() {
    let test = current_test().expect("running under the harness");
    assert_eq!(test.class(), "HostTest");
}

#[harness_test]
#[should_panic(expected = "body failed")]
fn panics_surface_unchanged() {
    panic!("body failed");
}

#[harness_test]
fn early_return_is_supported() {
    if current_test().is_some() {
        return;
    }
    unreachable!("harness always sets the current test");
}

#[test]
fn teardown_resets_identity_set_by_body() {
    let outcome = Harness::global().run_test(module_path!(), "sets_identity", || {
        set_current_identity(Some(Identity::new(2, "one")));
    });
    assert_eq!(outcome, TestOutcome::Passed);
    assert_eq!(current_identity(), None);
    assert_eq!(current_test(), None);
}
