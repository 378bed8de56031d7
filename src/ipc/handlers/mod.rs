pub mod audit;
pub mod backup_exchange;
pub mod core;
pub mod grades;
pub mod periods;
pub mod report_cards;
pub mod reports;
pub mod setup;
