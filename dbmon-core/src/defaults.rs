//! Defaults merging.
//!
//! Every unset `monitoring`/`tls` field of an entry is filled from, in order:
//! the provider defaults for the entry's provider, then the global defaults.
//! Precedence is per field. Document-supplied defaults sit on top of the
//! built-in ones at each level. `connection` and `credentials` are never
//! touched, and merging an already merged entry changes nothing.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{DatabaseEntry, GlobalDefaults, MonitoringConfig, Provider, ProviderDefaults};

/// Precomputed default layers for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsMerger {
    global: GlobalDefaults,
    providers: BTreeMap<Provider, ProviderDefaults>,
}

impl Default for DefaultsMerger {
    fn default() -> Self {
        Self::new(&GlobalDefaults::default(), &BTreeMap::new())
    }
}

impl DefaultsMerger {
    /// Layers document-supplied defaults over the built-in ones.
    pub fn new(
        global: &GlobalDefaults,
        providers: &BTreeMap<Provider, ProviderDefaults>,
    ) -> Self {
        let mut merged_global = global.clone();
        merged_global.merge_from(&GlobalDefaults::builtin());

        let providers = [
            Provider::Container,
            Provider::Ec2,
            Provider::Rds,
            Provider::Aurora,
        ]
        .into_iter()
        .map(|provider| {
            let mut layer = providers.get(&provider).cloned().unwrap_or_default();
            layer.merge_from(&ProviderDefaults::builtin(provider));
            (provider, layer)
        })
        .collect();

        Self {
            global: merged_global,
            providers,
        }
    }

    /// Merger for the defaults carried by `config`.
    pub fn for_config(config: &MonitoringConfig) -> Self {
        Self::new(&config.global_defaults, &config.provider_defaults)
    }

    /// Fills unset fields of one entry.
    pub fn merge_entry(&self, entry: &mut DatabaseEntry) {
        if let Some(layer) = self.providers.get(&entry.provider()) {
            entry.monitoring.merge_from(&layer.monitoring);
            entry.tls.merge_from(&layer.tls);
        }
        entry
            .monitoring
            .merge_from(&self.global.monitoring_for(entry.db_type));
        entry.tls.merge_from(&self.global.tls);
    }

    /// Fills unset fields of every entry, disabled ones included.
    pub fn apply(&self, config: &mut MonitoringConfig) {
        for entry in &mut config.entries {
            self.merge_entry(entry);
        }
        debug!("Merged defaults into {} entries", config.entries.len());
    }
}

/// Applies the defaults carried by `config` to its own entries.
pub fn merge_defaults(mut config: MonitoringConfig) -> MonitoringConfig {
    DefaultsMerger::for_config(&config).apply(&mut config);
    config
}
