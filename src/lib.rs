//! Core library for the `get-song` downloader.
//!
//! Drives `yt-dlp` to fetch single audio tracks, resolves source URLs out of
//! the metadata of previously downloaded files, enforces the local filename
//! convention, and mirrors progress into a persistent Termux notification.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod download;
pub mod error;
pub mod normalize;
pub mod notify;
pub mod resolve;
pub mod tags;
pub mod tools;
