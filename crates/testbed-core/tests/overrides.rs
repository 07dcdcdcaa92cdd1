//! 集成测试：作用域覆盖在正常返回、提前返回与 panic 三种退出路径下都按 LIFO 恢复。

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;
use testbed_core::env::{EnvironmentProvider, MemoryEnvironment, ProcessEnvironment};
use testbed_core::error::FixtureError;
use testbed_core::fixtures::{FixtureRepository, InMemoryFixtures};
use testbed_core::model::{Identity, Tenant, TenantDimension};
use testbed_core::overrides::{ScopeKind, active_scopes, clear_current_identity};
use testbed_core::settings::{LOCATIONS_ENABLED, ORGANIZATIONS_ENABLED, Settings};
use testbed_core::{
    as_admin, as_identity, as_user, current_identity, current_tenant, disable_tenancy, in_tenant,
    in_tenant_named, with_env, with_flags_disabled,
};

/// 逐层嵌套身份覆盖；每一层退出后检查当前身份回到该层进入前的值。
fn nested_identities(ids: &[u64], panic_innermost: bool) {
    let Some((id, rest)) = ids.split_first() else {
        if panic_innermost {
            panic!("innermost body failed");
        }
        return;
    };

    let before = current_identity();
    let identity = Identity::new(*id, format!("user{id}"));
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        as_identity(identity.clone(), || {
            assert_eq!(current_identity(), Some(identity.clone()));
            nested_identities(rest, panic_innermost);
        })
    }));
    assert_eq!(current_identity(), before);
    if let Err(payload) = result {
        panic::resume_unwind(payload);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn nested_identity_overrides_restore_in_lifo_order(
        ids in prop::collection::vec(1_u64..1_000, 1..6),
        panic_innermost in any::<bool>(),
    ) {
        clear_current_identity();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| nested_identities(&ids, panic_innermost)));
        prop_assert_eq!(outcome.is_err(), panic_innermost);
        prop_assert_eq!(current_identity(), None);
        prop_assert!(active_scopes().is_empty());
    }

    #[test]
    fn env_override_restores_exact_prior_state(
        initial in prop::collection::btree_map("[A-D]", "[a-z]{0,3}", 0..4),
        overrides in prop::collection::vec(("[A-F]", "[a-z]{0,3}"), 1..5),
    ) {
        let env = MemoryEnvironment::with_vars(initial.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let pairs: Vec<(&str, &str)> = overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        with_env(&env, &pairs, || {
            for (name, _) in &pairs {
                let last = pairs.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v.to_string());
                assert_eq!(env.get(name), last);
            }
        });

        prop_assert_eq!(env.snapshot(), initial);
    }
}

#[test]
fn mixed_scopes_unwind_together_on_panic() {
    clear_current_identity();
    let settings = Settings::with_flags([(ORGANIZATIONS_ENABLED, true)]);
    let org = Tenant::organization(10, "Organization 1");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        with_flags_disabled(&settings, &[ORGANIZATIONS_ENABLED], || {
            in_tenant(org.clone(), || {
                as_identity(Identity::new(2, "one"), || {
                    assert_eq!(
                        active_scopes(),
                        vec![
                            ScopeKind::Flags,
                            ScopeKind::Tenant(TenantDimension::Organization),
                            ScopeKind::Identity,
                        ]
                    );
                    panic!("body failed");
                })
            })
        })
    }));

    assert!(result.is_err());
    assert!(active_scopes().is_empty());
    assert_eq!(current_identity(), None);
    assert_eq!(current_tenant(TenantDimension::Organization), None);
    assert_eq!(settings.flag(ORGANIZATIONS_ENABLED), Some(true));
}

#[test]
fn tenant_dimensions_are_independent() {
    let fixtures = InMemoryFixtures::standard();
    let org = fixtures.tenant("organization1").expect("organization fixture");
    let loc = fixtures.tenant("location1").expect("location fixture");
    let other_org = Tenant::organization(11, "Organization 2");

    in_tenant(org.clone(), || {
        in_tenant(loc.clone(), || {
            assert_eq!(current_tenant(TenantDimension::Organization), Some(org.clone()));
            assert_eq!(current_tenant(TenantDimension::Location), Some(loc.clone()));

            in_tenant(other_org.clone(), || {
                assert_eq!(current_tenant(TenantDimension::Organization), Some(other_org.clone()));
                assert_eq!(current_tenant(TenantDimension::Location), Some(loc.clone()));
            });

            assert_eq!(current_tenant(TenantDimension::Organization), Some(org.clone()));
        });
        assert_eq!(current_tenant(TenantDimension::Location), None);
    });
    assert_eq!(current_tenant(TenantDimension::Organization), None);
}

#[test]
fn overlapping_flag_scopes_on_worker_threads_keep_shared_value() {
    let settings = Settings::with_flags([(ORGANIZATIONS_ENABLED, true)]);
    let barrier = Arc::new(Barrier::new(2));

    // 先进入的线程先退出，两个作用域交错而非嵌套。
    let (first_settings, first_gate) = (settings.clone(), Arc::clone(&barrier));
    let first = thread::spawn(move || {
        with_flags_disabled(&first_settings, &[ORGANIZATIONS_ENABLED], || {
            first_gate.wait();
        });
        let after = first_settings.flag(ORGANIZATIONS_ENABLED);
        first_gate.wait();
        after
    });

    let (second_settings, second_gate) = (settings.clone(), Arc::clone(&barrier));
    let second = thread::spawn(move || {
        with_flags_disabled(&second_settings, &[ORGANIZATIONS_ENABLED], || {
            second_gate.wait();
            second_gate.wait();
            second_settings.flag(ORGANIZATIONS_ENABLED)
        })
    });

    assert_eq!(first.join().expect("first worker"), Some(true));
    assert_eq!(second.join().expect("second worker"), Some(false));
    assert_eq!(settings.flag(ORGANIZATIONS_ENABLED), Some(true));
}

#[test]
fn in_tenant_named_resolves_tenant_fixtures() {
    let fixtures = InMemoryFixtures::standard();

    let seen = in_tenant_named(&fixtures, "location1", || current_tenant(TenantDimension::Location))
        .expect("location fixture");
    assert_eq!(seen.map(|tenant| tenant.name), Some("Location 1".to_string()));
    assert_eq!(current_tenant(TenantDimension::Location), None);

    let mut ran = false;
    let err = in_tenant_named(&fixtures, "nowhere", || ran = true).expect_err("unknown tenant");
    assert_eq!(
        err,
        FixtureError::UnknownFixture {
            name: "nowhere".to_string()
        }
    );
    assert!(!ran);
}

#[test]
fn disable_tenancy_restores_unset_flags_as_unset() {
    let settings = Settings::with_flags([(ORGANIZATIONS_ENABLED, true)]);

    let seen = disable_tenancy(&settings, || {
        (settings.flag(ORGANIZATIONS_ENABLED), settings.flag(LOCATIONS_ENABLED))
    });

    assert_eq!(seen, (Some(false), Some(false)));
    assert_eq!(settings.flag(ORGANIZATIONS_ENABLED), Some(true));
    assert_eq!(settings.flag(LOCATIONS_ENABLED), None);
}

#[test]
fn as_user_resolves_fixture_names() {
    clear_current_identity();
    let fixtures = InMemoryFixtures::standard();

    let login = as_user(&fixtures, "two", || current_identity().map(|identity| identity.login))
        .expect("fixture two");
    assert_eq!(login.as_deref(), Some("two"));

    let admin = as_admin(&fixtures, || current_identity().is_some_and(|identity| identity.admin))
        .expect("admin fixture");
    assert!(admin);
    assert_eq!(current_identity(), None);
}

#[test]
fn unknown_user_fixture_never_runs_body() {
    clear_current_identity();
    let fixtures = InMemoryFixtures::standard();
    let mut ran = false;

    let err = as_user(&fixtures, "ghost", || ran = true).expect_err("unknown fixture");

    assert_eq!(
        err,
        FixtureError::UnknownFixture {
            name: "ghost".to_string()
        }
    );
    assert!(!ran);
    assert!(active_scopes().is_empty());
}

#[test]
fn early_return_from_body_still_restores() {
    clear_current_identity();
    let found = (|| {
        as_identity(Identity::new(3, "two"), || {
            for candidate in ["a", "b", "c"] {
                if candidate == "b" {
                    return Some(candidate);
                }
            }
            None
        })
    })();
    assert_eq!(found, Some("b"));
    assert_eq!(current_identity(), None);
}

#[test]
fn process_env_override_removes_previously_absent_variable() {
    const PRESENT: &str = "TESTBED_OVERRIDES_IT_PRESENT";
    const ABSENT: &str = "TESTBED_OVERRIDES_IT_ABSENT";
    let env = ProcessEnvironment;
    env.set(PRESENT, "before");
    env.remove(ABSENT);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        with_env(&env, &[(PRESENT, "during"), (ABSENT, "")], || {
            assert_eq!(env.get(PRESENT).as_deref(), Some("during"));
            assert_eq!(env.get(ABSENT).as_deref(), Some(""));
            panic!("body failed");
        })
    }));

    assert!(result.is_err());
    assert_eq!(env.get(PRESENT).as_deref(), Some("before"));
    assert_eq!(env.get(ABSENT), None);
    env.remove(PRESENT);
}
