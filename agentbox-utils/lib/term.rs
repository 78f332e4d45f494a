//! This module provides shared terminal primitives for CLI visualizations.
//!
//! The `MULTI_PROGRESS` static is a lazy-initialized `Arc<MultiProgress>`
//! that manages a collection of progress bars, so multiple downloads can
//! render simultaneously without interleaving their output.

use indicatif::{MultiProgress, MultiProgressAlignment};
use once_cell::sync::Lazy;
use std::sync::{Arc, LazyLock};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Global multi-progress bar registry for CLI downloads.
pub static MULTI_PROGRESS: Lazy<Arc<MultiProgress>> = Lazy::new(|| {
    let mp = MultiProgress::new();
    mp.set_alignment(MultiProgressAlignment::Top);
    Arc::new(mp)
});

/// A green checkmark used in CLI success messages.
pub static CHECKMARK: LazyLock<String> =
    LazyLock::new(|| format!("{}", console::style("✓").green()));

/// A red cross used in CLI failure messages.
pub static CROSSMARK: LazyLock<String> = LazyLock::new(|| format!("{}", console::style("✗").red()));
