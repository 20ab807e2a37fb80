//! Cloud text-to-speech backend.
//!
//! Text is wrapped in SSML (voice, language, optional `mstts:express-as`
//! style/role) and sent to the speech service, which answers with a RIFF
//! container of 16-bit mono PCM.
//!
//! # Configuration
//!
//! ```json
//! {
//!   "subscriptionKey": "<from your Azure Speech resource>",
//!   "region": "uksouth",
//!   "voice": "en-US-JennyNeural",
//!   "language": "en-US",
//!   "style": "cheerful",
//!   "sampleRate": 24000
//! }
//! ```
//!
//! The REST client is compiled with the `azure` feature. Without it the
//! adapter still parses and validates configuration but cannot connect.

pub mod adapter;
pub mod client;
pub mod ssml;

pub use adapter::{decode_cloud_audio, CloudAdapter, CloudConfig};
pub use client::{AzureClientFactory, CloudClientFactory, CloudError, CloudSpeechClient};
