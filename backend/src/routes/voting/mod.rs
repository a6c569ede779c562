// Voting routes: casting and own history for employees, ledger upkeep for administrators

pub mod admin;
pub mod client;
