//! Shared test harness modules for the Stargaze CLI.

use super::*;

mod helpers;
