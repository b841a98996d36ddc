//! CLI command handlers

pub mod db;
