//! Concurrent reloads against the strategy registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tessera_core::models::trust::SpTrustConfig;
use tessera_core::notify::LogNotifier;
use tessera_core::store::ConfigStore;
use tessera_sp::registry::{RegistryPhase, StrategyRegistry, StrategyState};

fn config(i: usize) -> SpTrustConfig {
    let cert = rcgen::generate_simple_self_signed(vec![format!("idp{i}.example.com")])
        .unwrap()
        .cert
        .pem();
    SpTrustConfig {
        entry_point: format!("https://idp{i}.example.com/sso"),
        issuer: format!("sp-{i}"),
        callback_url: format!("https://sp{i}.example.com/login/callback"),
        cert,
        ..Default::default()
    }
}

#[test]
fn concurrent_reloads_leave_exactly_one_whole_configuration() {
    const N: usize = 16;
    let configs: Vec<SpTrustConfig> = (0..N).map(config).collect();
    let registry = Arc::new(StrategyRegistry::new());
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        // Readers check every snapshot they see is one complete configuration.
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    if let StrategyState::Active(strategy) = registry.current() {
                        let matching = configs.iter().filter(|c| strategy.matches(c)).count();
                        assert_eq!(matching, 1, "observed a hybrid strategy");
                    }
                }
            });
        }

        let writers: Vec<_> = configs
            .iter()
            .map(|cfg| {
                let registry = &registry;
                scope.spawn(move || registry.reload(cfg))
            })
            .collect();
        for writer in writers {
            assert!(writer.join().unwrap().is_enabled());
        }
        done.store(true, Ordering::SeqCst);
    });

    let active = registry.active().unwrap();
    let matching: Vec<_> = configs.iter().filter(|c| active.matches(c)).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(registry.generation(), N as u64);
    assert_eq!(active.generation(), N as u64);
    assert_eq!(registry.phase(), RegistryPhase::Loaded);
}

#[test]
fn interleaved_enable_and_disable_never_expose_partial_state() {
    let enabled = config(0);
    let disabled = SpTrustConfig {
        cert: String::new(),
        ..enabled.clone()
    };
    let registry = StrategyRegistry::new();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                match registry.current() {
                    StrategyState::Active(strategy) => assert!(strategy.matches(&enabled)),
                    StrategyState::Disabled(_) => {}
                }
            }
        });
        for i in 0..50 {
            registry.reload(if i % 2 == 0 { &enabled } else { &disabled });
        }
        done.store(true, Ordering::SeqCst);
    });

    // 50 reloads, the last one disabling.
    assert!(!registry.is_enabled());
    assert_eq!(registry.generation(), 50);
}

#[test]
fn interleaved_saves_and_reloads_end_on_latest_document() {
    const N: usize = 8;
    let dir = tempfile::TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path().join("saml-config.json"));
    let configs: Vec<SpTrustConfig> = (0..N).map(config).collect();
    let registry = StrategyRegistry::new();

    for _ in 0..4 {
        std::thread::scope(|scope| {
            for cfg in &configs {
                let (store, registry) = (&store, &registry);
                scope.spawn(move || {
                    store.save(cfg).unwrap();
                    registry.reload_from(store, &LogNotifier);
                });
            }
        });

        // Every save happened before the last reload read the document.
        let on_disk = store.load().unwrap();
        let active = registry.active().unwrap();
        assert!(active.matches(&on_disk));
        assert_eq!(active.issuer(), on_disk.issuer);
    }
}
