//! # Wedding RSVP Bot
//!
//! A Telegram bot that collects wedding RSVPs and keeps guests informed.
//!
//! ## Features
//! - Guest onboarding with display name and attendance status
//! - Admin broadcasts to every registered guest, with retry of failed deliveries
//! - Enhanced broadcasts: the admin message followed by useful info, event details
//!   and the main menu, sent to guests who completed onboarding
//! - Automatic reminders 30, 7 and 1 days before the event
//! - Persistent storage with SQLite and a health endpoint for deployments

/// Bot command handlers and callback processing
pub mod bot;
/// Configuration management and environment variables
pub mod config;
/// Database models, connections, and migrations
pub mod database;
/// Broadcast pipeline, reminders, transport and health services
pub mod services;
/// Utility functions for datetime, validation, and formatting
pub mod utils;
