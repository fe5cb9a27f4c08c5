#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The crate loads a pretrained vision-language model once, wraps a question about an image
//! in the model's chat template, and decodes the answer greedily.
//!
//! - [`host::ModelHost`] owns the model and processor for the lifetime of the process.
//! - [`vqa::answer_question`] turns one (image, question) pair into one answer.
//!
//! # Example
//!
//! ```no_run
//! use vibook_vqa::{config::HostConfig, host::ModelHost, imgproc::decode_image, vqa::answer_question};
//!
//! let host = ModelHost::load(&HostConfig::default());
//! let image = decode_image(&std::fs::read("book.jpg")?)?;
//! let answer = answer_question(&host, image, "What is the title of this book?")?;
//! println!("{answer}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Chat messages and chat template rendering.
pub mod chat;

/// Model source, device and precision configuration.
pub mod config;

/// Error types for the crate.
mod error;

/// Greedy token generation.
pub mod generation;

/// Process-wide ownership of the loaded model and processor.
pub mod host;

/// Resolution of model files from a local directory or the Hugging Face Hub.
pub mod hub;

/// Image decoding, color conversion and pixel preprocessing.
pub mod imgproc;

/// The model and decoding session abstractions.
pub mod model;

/// The PaliGemma backend built on `candle-transformers`.
pub mod paligemma;

/// Conversion between (image, text) and model tensors.
pub mod processor;

/// Visual question answering on top of the model host.
pub mod vqa;

/// Weight-free model and processor for tests (feature-gated).
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::VqaError;
