//! Application state shared across handlers

use std::sync::Arc;

use hackreg_core::{
    HackregConfig, MemoryCache, NativeError, PermissionRegistry, PgProvider, QueryEngine,
};

use crate::mappers::{ExtraCreditMapper, HackathonMapper, PreRegistrationMapper};

/// Access rules of every mapper, frozen.
pub fn registry() -> PermissionRegistry {
    let mut builder = PermissionRegistry::builder();
    builder
        .declare::<HackathonMapper>()
        .declare::<PreRegistrationMapper>()
        .declare::<ExtraCreditMapper>();
    builder.build()
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: QueryEngine,
    registry: PermissionRegistry,
    hackathons: HackathonMapper,
    pre_registrations: PreRegistrationMapper,
    extra_credit: ExtraCreditMapper,
}

impl AppState {
    pub fn new(engine: QueryEngine) -> Self {
        let hackathons = HackathonMapper::new(engine.clone());
        let pre_registrations = PreRegistrationMapper::new(engine.clone(), hackathons.clone());
        let extra_credit = ExtraCreditMapper::new(engine.clone(), hackathons.clone());
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                registry: registry(),
                hackathons,
                pre_registrations,
                extra_credit,
            }),
        }
    }

    /// Lazily connecting PostgreSQL pool, plus the memory cache when enabled.
    pub fn from_config(config: &HackregConfig) -> Result<Self, NativeError> {
        let provider = PgProvider::connect_lazy(&config.database)?;
        let mut engine = QueryEngine::new(Arc::new(provider));
        if config.cache.enabled {
            engine = engine.with_cache(Arc::new(MemoryCache::new(&config.cache)));
        }
        tracing::debug!(
            max_connections = config.database.max_connections,
            cache = config.cache.enabled,
            "application state ready"
        );
        Ok(Self::new(engine))
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.inner.engine
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.inner.registry
    }

    pub fn hackathons(&self) -> &HackathonMapper {
        &self.inner.hackathons
    }

    pub fn pre_registrations(&self) -> &PreRegistrationMapper {
        &self.inner.pre_registrations
    }

    pub fn extra_credit(&self) -> &ExtraCreditMapper {
        &self.inner.extra_credit
    }
}
