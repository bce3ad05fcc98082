use crate::capability::{Requirement, RuntimeCapabilities};

/// Whether an example should be scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Run,
    Excluded(String),
}

impl FilterDecision {
    pub fn is_run(&self) -> bool {
        matches!(self, FilterDecision::Run)
    }
}

/// Tag predicates evaluated against a single capability snapshot.
///
/// Privileged and network examples are excluded unless their override is
/// enabled; once an override is enabled the run is restricted to the
/// examples carrying that tag.
#[derive(Debug, Clone)]
pub struct FilterRules {
    caps: RuntimeCapabilities,
}

impl FilterRules {
    pub fn new(caps: RuntimeCapabilities) -> Self {
        Self { caps }
    }

    pub fn capabilities(&self) -> &RuntimeCapabilities {
        &self.caps
    }

    pub fn evaluate(&self, requirements: &[Requirement]) -> FilterDecision {
        let inclusion = self.inclusion_tags();
        if !inclusion.is_empty() && !requirements.iter().any(|req| inclusion.contains(req)) {
            let names: Vec<_> = inclusion.iter().map(ToString::to_string).collect();
            return FilterDecision::Excluded(format!(
                "run restricted to {} examples",
                names.join(" or ")
            ));
        }

        for requirement in requirements {
            if let Some(reason) = self.unmet(requirement) {
                return FilterDecision::Excluded(reason);
            }
        }
        FilterDecision::Run
    }

    /// Focus filtering applies when something is focused and the run is not on CI.
    pub fn focus_active(&self, any_focused: bool) -> bool {
        any_focused && !self.caps.ci
    }

    fn inclusion_tags(&self) -> Vec<Requirement> {
        let mut tags = Vec::new();
        if self.caps.privileged_enabled {
            tags.push(Requirement::Privileged);
        }
        if self.caps.network_enabled {
            tags.push(Requirement::Network);
        }
        tags
    }

    fn unmet(&self, requirement: &Requirement) -> Option<String> {
        let caps = &self.caps;
        match requirement {
            Requirement::Runtime(req) if !caps.version_filters_ignored => (!req
                .satisfied_by(&caps.runtime_version))
            .then(|| format!("requires runtime {req}, have {}", caps.runtime_version)),
            Requirement::Manager(req) if !caps.version_filters_ignored => (!req
                .satisfied_by(&caps.manager_version))
            .then(|| format!("requires manager {req}, have {}", caps.manager_version)),
            Requirement::Vcs(req) if !caps.version_filters_ignored => match &caps.vcs_version {
                Some(version) if req.satisfied_by(version) => None,
                Some(version) => Some(format!("requires git {req}, have {version}")),
                None => Some(format!("requires git {req}, git not found")),
            },
            Requirement::Runtime(_) | Requirement::Manager(_) | Requirement::Vcs(_) => None,
            Requirement::Network => {
                (!caps.network_enabled).then(|| "network examples are disabled".to_string())
            }
            Requirement::Privileged => {
                (!caps.privileged_enabled).then(|| "sudo examples are disabled".to_string())
            }
            Requirement::ManagerUpstream => (!caps.manager_upstream)
                .then(|| "manager is not tracking upstream".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use semver::Version;

    use super::*;

    fn caps() -> RuntimeCapabilities {
        RuntimeCapabilities::new(Version::new(2, 6, 0), Version::new(3, 0, 0))
            .with_vcs_version(Version::new(2, 39, 2))
    }

    #[test]
    fn untagged_examples_run() {
        assert_eq!(FilterRules::new(caps()).evaluate(&[]), FilterDecision::Run);
    }

    #[test]
    fn version_requirement_above_runtime_is_excluded() {
        let rules = FilterRules::new(caps());
        let decision = rules.evaluate(&[Requirement::runtime("2.7").unwrap()]);
        assert_eq!(
            decision,
            FilterDecision::Excluded("requires runtime >= 2.7.0, have 2.6.0".to_string())
        );
        assert!(rules
            .evaluate(&[Requirement::runtime("2.5").unwrap()])
            .is_run());
    }

    #[test]
    fn version_override_runs_everything() {
        let rules = FilterRules::new(caps().with_version_filters_ignored(true));
        assert!(rules
            .evaluate(&[
                Requirement::runtime("9").unwrap(),
                Requirement::manager("9").unwrap(),
                Requirement::vcs("9").unwrap(),
            ])
            .is_run());
    }

    #[test]
    fn missing_git_excludes_vcs_examples() {
        let rules = FilterRules::new(RuntimeCapabilities::new(
            Version::new(2, 6, 0),
            Version::new(3, 0, 0),
        ));
        assert!(!rules.evaluate(&[Requirement::vcs("1.0").unwrap()]).is_run());
    }

    #[test]
    fn network_override_restricts_run_to_network_examples() {
        let disabled = FilterRules::new(caps());
        assert!(!disabled.evaluate(&[Requirement::Network]).is_run());

        let enabled = FilterRules::new(caps().with_network(true));
        assert!(enabled.evaluate(&[Requirement::Network]).is_run());
        assert!(!enabled.evaluate(&[]).is_run());
    }

    #[test]
    fn both_overrides_include_either_tag() {
        let rules = FilterRules::new(caps().with_network(true).with_privileged(true));
        assert!(rules.evaluate(&[Requirement::Network]).is_run());
        assert!(rules.evaluate(&[Requirement::Privileged]).is_run());
        assert!(!rules.evaluate(&[]).is_run());
    }

    #[test]
    fn upstream_examples_need_upstream_manager() {
        assert!(!FilterRules::new(caps())
            .evaluate(&[Requirement::ManagerUpstream])
            .is_run());
        assert!(FilterRules::new(caps().with_manager_upstream(true))
            .evaluate(&[Requirement::ManagerUpstream])
            .is_run());
    }

    #[test]
    fn focus_is_ignored_on_ci() {
        assert!(FilterRules::new(caps()).focus_active(true));
        assert!(!FilterRules::new(caps()).focus_active(false));
        assert!(!FilterRules::new(caps().with_ci(true)).focus_active(true));
    }
}
