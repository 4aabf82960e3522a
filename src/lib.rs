pub mod auth;
pub mod categories;
pub mod core;
pub mod customers;
pub mod dashboard;
pub mod email;
pub mod employees;
pub mod invoices;
pub mod leads;
pub mod main_module;
pub mod quotations;
pub mod security;
pub mod tickets;
