//! The crawl-and-extract engine.
//!
//! Listing pages are processed in a fixed pipeline per source:
//!
//! 1. **Fetching** ([`fetch`]): download the entry page with browser headers
//! 2. **Ranking** ([`ranker`]): pick the selector that currently matches the
//!    most article containers
//! 3. **Extraction** ([`extract`]): turn each container into a record via
//!    ordered fallback strategies
//! 4. **Content** ([`content`]): optionally fetch each article page for its body
//!
//! [`crawl`] runs steps 1-3 for every source concurrently.
//!
//! # Failure isolation
//!
//! | Failure | Recovered at | Effect |
//! |---------|--------------|--------|
//! | DNS / timeout / non-2xx | [`fetch`] | source or body is empty |
//! | bad selector, missing title or link | [`extract`] | element skipped |
//! | panicking source task | [`crawl`] | source contributes nothing |

pub mod content;
pub mod crawl;
pub mod extract;
pub mod fetch;
pub mod ranker;
