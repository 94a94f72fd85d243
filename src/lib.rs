//! Booker - appointment booking for a small service business
//!
//! Employees publish time slots, customers book and release them, and
//! administrators manage accounts and assign slots to any employee.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod views;
