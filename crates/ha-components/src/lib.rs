//! Integrations
//!
//! - [`nest`]: config flow that links a Nest account over OAuth
//! - [`tivo`]: TiVo DVRs controlled over the TCP Remote Protocol

pub mod nest;
pub mod tivo;

pub use nest::{register_flows, NestAuth, NestConfigFlow, NestError, NestOAuthClient, NestTokens};
pub use tivo::{
    setup_platform, spawn_polling, PlayerState, TivoDevice, TivoDiscovery, TivoError, TivoPlatform,
    TivoRemote,
};
