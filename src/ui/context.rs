//! Terminal vs CI detection

use std::io::IsTerminal;

/// CI providers recognized by their environment markers
const CI_MARKERS: &[(&str, &str)] = &[
    ("GITHUB_ACTIONS", "GitHub Actions"),
    ("GITLAB_CI", "GitLab CI"),
    ("CIRCLECI", "CircleCI"),
    ("BUILDKITE", "Buildkite"),
    ("JENKINS_URL", "Jenkins"),
    ("TF_BUILD", "Azure Pipelines"),
    ("TEAMCITY_VERSION", "TeamCity"),
    ("CI", "CI"),
];

/// How output should be rendered
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    auto_yes: bool,
    ci: Option<&'static str>,
}

impl UiContext {
    /// Inspect the terminal and environment
    pub fn detect() -> Self {
        let ci = detect_ci(|name| std::env::var_os(name).is_some());
        let tty = std::io::stdout().is_terminal() && std::io::stdin().is_terminal();
        Self {
            interactive: tty && ci.is_none(),
            auto_yes: false,
            ci,
        }
    }

    /// Plain output, no prompts
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
            ci: None,
        }
    }

    /// Answer every prompt with yes
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Spinners and colored cliclack output
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    /// Name of the CI provider we are running under
    pub fn ci_provider(&self) -> Option<&'static str> {
        self.ci
    }
}

fn detect_ci(is_set: impl Fn(&str) -> bool) -> Option<&'static str> {
    CI_MARKERS
        .iter()
        .find(|(var, _)| is_set(var))
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_context() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(!ctx.is_interactive());
        assert!(ctx.auto_yes());
        assert!(ctx.ci_provider().is_none());
    }

    #[test]
    fn specific_provider_wins_over_generic_ci() {
        let provider = detect_ci(|name| name == "CI" || name == "GITHUB_ACTIONS");
        assert_eq!(provider, Some("GitHub Actions"));
        assert_eq!(detect_ci(|name| name == "CI"), Some("CI"));
        assert_eq!(detect_ci(|_| false), None);
    }
}
