//! CLI module - Command-line interface for Marketwatch
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// Marketwatch - marketplace search pipeline
#[derive(Parser)]
#[command(name = "marketwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and job dispatcher
    #[command(alias = "d")]
    Daemon,

    /// Run one search now and print its results
    #[command(alias = "r")]
    Run {
        /// Search query
        #[arg(required = true)]
        query: Vec<String>,
        /// Marketplace location, e.g. "austin"
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        /// Number of listings to print
        #[arg(long, default_value = "10")]
        limit: u64,
    },

    /// Show the scraping service's remaining quota
    Quota,

    /// Check whether a URL is a supported marketplace page
    Preset {
        /// Listing or search URL
        url: String,
    },

    /// Create default config file
    Init,
}

pub use commands::*;
