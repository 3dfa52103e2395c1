//! Visual Genome records from two interchangeable sources: the live API,
//! or a locally cached metadata bundle backed by the API for scene graphs.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod local;
pub mod output;
pub mod remote;
pub mod source;
