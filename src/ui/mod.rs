//! Terminal output
//!
//! `cliclack` styling in interactive terminals, plain `[OK]`/`[FAIL]` lines
//! in CI logs.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_error, outro_success, outro_warn, remark, section, step_error_detail,
    step_info, step_ok, step_ok_detail, step_skipped, step_warn, step_warn_hint,
};
pub use progress::RunSpinner;
pub use prompts::confirm;
pub use theme::init_theme;
