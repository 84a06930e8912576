pub mod action;
pub mod cli_args;
pub mod config;
pub mod dataset;
pub mod edge_odds;
pub mod error;
pub mod export;
pub mod match_prob;
pub mod name_match;
pub mod pipeline;
pub mod player_index;
pub mod records;
pub mod strength_model;
pub mod telemetry;
