//! Business logic services

pub mod catalog;
pub mod fines;
pub mod loans;
pub mod members;
pub mod reports;
pub mod settlement;
pub mod stats;

use std::sync::Arc;

use crate::{clock::Clock, config::LoansConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub catalog: catalog::CatalogService,
    pub members: members::MembersService,
    pub loans: loans::LoansService,
    pub settlement: settlement::SettlementService,
    pub stats: stats::StatsService,
    pub reports: reports::ReportsService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, loans_config: LoansConfig, clock: Arc<dyn Clock>) -> Self {
        let fines = fines::FinePolicy::from(&loans_config);
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            members: members::MembersService::new(repository.clone(), clock.clone()),
            loans: loans::LoansService::new(repository.clone(), loans_config, clock.clone()),
            settlement: settlement::SettlementService::new(repository.clone(), fines, clock.clone()),
            stats: stats::StatsService::new(repository.clone(), fines, clock),
            reports: reports::ReportsService::new(repository.clone()),
            repository,
        }
    }
}
