use std::sync::Arc;

use tally_crypto::HashCost;
use tally_ledger::{BootstrapOutcome, LedgerConfig, LedgerService};
use tally_store::InMemoryAccountStore;

/// An in-memory ledger with the admin seeded, and the admin's credential.
pub fn seeded_ledger() -> (LedgerService, String) {
    let config = LedgerConfig {
        admin_credential: Some("admin-secret".into()),
        hash_cost: HashCost::insecure_fast(),
        ..Default::default()
    };
    let ledger = LedgerService::new(Arc::new(InMemoryAccountStore::new()), config).unwrap();
    match ledger.bootstrap().ensure_admin_seeded().unwrap() {
        BootstrapOutcome::Seeded { .. } => {}
        other => panic!("expected a fresh seed, got {other:?}"),
    }
    (ledger, "admin-secret".to_string())
}
