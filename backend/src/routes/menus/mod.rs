// Menu routes: reads for every employee, writes for administrators

pub mod admin;
pub mod client;

pub const MENU_NOT_FOUND: &str = "Menu not found.";
