//! Line-oriented output with a plain fallback for CI logs

use super::context::UiContext;
use console::{style, StyledObject};

#[derive(Clone, Copy)]
enum Level {
    Ok,
    Warn,
    Fail,
    Info,
    Skip,
}

impl Level {
    fn tag(self) -> StyledObject<&'static str> {
        match self {
            Self::Ok => style("[OK]").green(),
            Self::Warn => style("[WARN]").yellow(),
            Self::Fail => style("[FAIL]").red(),
            Self::Info => style("[INFO]").cyan(),
            Self::Skip => style("[-]").dim(),
        }
    }

    fn fancy(self, message: &str) {
        let _ = match self {
            Self::Ok => cliclack::log::success(message),
            Self::Warn => cliclack::log::warning(message),
            Self::Fail => cliclack::log::error(message),
            Self::Info => cliclack::log::info(message),
            Self::Skip => cliclack::log::remark(message),
        };
    }
}

fn step(ctx: &UiContext, level: Level, message: &str) {
    if ctx.use_fancy_output() {
        level.fancy(message);
    } else {
        println!("  {} {}", level.tag(), message);
    }
}

/// Banner at the start of a command
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        println!("{}", style(title).cyan().bold());
        if let Some(ci) = ctx.ci_provider() {
            println!("{}", style(format!("running under {}", ci)).dim());
        }
        println!();
    }
}

fn outro(ctx: &UiContext, level: Level, message: &str) {
    if ctx.use_fancy_output() {
        let styled = match level {
            Level::Ok => style(message).green().bold(),
            Level::Warn => style(message).yellow().bold(),
            _ => style(message).red().bold(),
        };
        cliclack::outro(styled).ok();
    } else {
        println!();
        println!("{} {}", level.tag(), message);
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    outro(ctx, Level::Ok, message);
}

pub fn outro_error(ctx: &UiContext, message: &str) {
    outro(ctx, Level::Fail, message);
}

pub fn outro_warn(ctx: &UiContext, message: &str) {
    outro(ctx, Level::Warn, message);
}

/// Bold section header
pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    step(ctx, Level::Ok, message);
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Level::Ok, &format!("{} ({})", message, style(detail).dim()));
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    step(ctx, Level::Warn, message);
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    step(ctx, Level::Warn, &format!("{} - {}", message, style(hint).dim()));
}

pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Level::Fail, &format!("{}: {}", message, style(detail).red()));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    step(ctx, Level::Info, message);
}

/// A step that did not run, with the reason
pub fn step_skipped(ctx: &UiContext, name: &str, reason: &str) {
    step(
        ctx,
        Level::Skip,
        &format!("{} {}", style(name).dim(), style(format!("({})", reason)).dim()),
    );
}

/// Indented, dimmed block (tool output tails)
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        for line in message.lines() {
            println!("      {}", style(line).dim());
        }
    }
}

pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_does_not_panic() {
        let ctx = UiContext::non_interactive();
        intro(&ctx, "release");
        section(&ctx, "ubuntu-22.04");
        step_ok_detail(&ctx, "build", "12.0s");
        step_skipped(&ctx, "upload", "build failed");
        step_error_detail(&ctx, "build", "exit code 1");
        remark(&ctx, "line one\nline two");
        outro_error(&ctx, "1 platform failed");
    }
}
