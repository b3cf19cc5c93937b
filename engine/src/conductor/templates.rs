//! Plan Template Store
//!
//! Per project type, the ordered step blueprint plans are generated from.
//! Templates are loaded once when the store is built and are read-only after
//! that.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use sdk::errors::EngineError;
use sdk::types::{ProjectType, StepType};

/// Blueprint for one plan step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub step_type: StepType,
    /// Template ids that must complete first
    pub dependencies: Vec<String>,
    /// Base duration in minutes before complexity scaling
    pub base_duration: u32,
    pub required: bool,
    /// Requirement key that must be truthy for an optional step to be kept
    pub gate: Option<String>,
    pub order: u32,
}

/// Static row of a built-in template table
struct Blueprint {
    order: u32,
    id: &'static str,
    name: &'static str,
    description: &'static str,
    step_type: StepType,
    dependencies: &'static [&'static str],
    base_duration: u32,
    gate: Option<&'static str>,
}

impl From<&Blueprint> for StepTemplate {
    fn from(row: &Blueprint) -> Self {
        Self {
            id: row.id.to_string(),
            name: row.name.to_string(),
            description: row.description.to_string(),
            step_type: row.step_type,
            dependencies: row.dependencies.iter().map(|d| d.to_string()).collect(),
            base_duration: row.base_duration,
            required: row.gate.is_none(),
            gate: row.gate.map(str::to_string),
            order: row.order,
        }
    }
}

/// Read-only template data keyed by project type
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<ProjectType, Vec<StepTemplate>>,
}

impl TemplateStore {
    /// Store with no templates; every lookup fails
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in website and automation templates
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(ProjectType::Website, expand(WEBSITE));
        templates.insert(ProjectType::Automation, expand(AUTOMATION));
        Self { templates }
    }

    /// Build a store from caller-provided templates, validating each one.
    pub fn from_templates(
        templates: HashMap<ProjectType, Vec<StepTemplate>>,
    ) -> Result<Self, EngineError> {
        for (project_type, steps) in &templates {
            validate_template(*project_type, steps)?;
        }
        Ok(Self { templates })
    }

    /// Ordered step blueprint for `project_type`
    pub fn template_for(&self, project_type: ProjectType) -> Result<&[StepTemplate], EngineError> {
        self.templates
            .get(&project_type)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::UnknownProjectType(project_type.to_string()))
    }

    pub fn project_types(&self) -> Vec<ProjectType> {
        ProjectType::ALL
            .into_iter()
            .filter(|t| self.templates.contains_key(t))
            .collect()
    }
}

/// Check the invariants plan generation relies on: unique ids and orders,
/// dependencies that exist with a lower order, and no required step hanging
/// off an optional one.
pub fn validate_template(
    project_type: ProjectType,
    steps: &[StepTemplate],
) -> Result<(), EngineError> {
    let invalid = |msg: String| EngineError::InvalidInput(format!("{} template: {}", project_type, msg));

    let mut ids = HashSet::new();
    let mut orders = HashSet::new();
    for step in steps {
        if !ids.insert(step.id.as_str()) {
            return Err(invalid(format!("duplicate step id '{}'", step.id)));
        }
        if !orders.insert(step.order) {
            return Err(invalid(format!("duplicate order {}", step.order)));
        }
        if !step.required && step.gate.is_none() {
            return Err(invalid(format!("optional step '{}' has no gate", step.id)));
        }
    }

    let by_id: HashMap<&str, &StepTemplate> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
    for step in steps {
        for dep in &step.dependencies {
            let Some(parent) = by_id.get(dep.as_str()) else {
                return Err(invalid(format!("'{}' depends on unknown '{}'", step.id, dep)));
            };
            if parent.order >= step.order {
                return Err(invalid(format!(
                    "'{}' is ordered before its dependency '{}'",
                    step.id, dep
                )));
            }
            if step.required && !parent.required {
                return Err(invalid(format!(
                    "required '{}' depends on optional '{}'",
                    step.id, dep
                )));
            }
        }
    }

    Ok(())
}

fn expand(rows: &[Blueprint]) -> Vec<StepTemplate> {
    rows.iter().map(StepTemplate::from).collect()
}

const WEBSITE: &[Blueprint] = &[
    Blueprint {
        order: 1,
        id: "setup_repo",
        name: "Set up repository",
        description: "Create the source repository, branch protection and CI skeleton",
        step_type: StepType::Setup,
        dependencies: &[],
        base_duration: 30,
        gate: None,
    },
    Blueprint {
        order: 2,
        id: "setup_database",
        name: "Provision database",
        description: "Provision the database and apply the initial schema",
        step_type: StepType::Infrastructure,
        dependencies: &["setup_repo"],
        base_duration: 60,
        gate: None,
    },
    Blueprint {
        order: 3,
        id: "setup_cms",
        name: "Set up CMS",
        description: "Install and configure the content management system",
        step_type: StepType::Setup,
        dependencies: &["setup_database"],
        base_duration: 45,
        gate: Some("cms"),
    },
    Blueprint {
        order: 4,
        id: "create_backend",
        name: "Build backend",
        description: "Implement the API and server-side logic",
        step_type: StepType::Development,
        dependencies: &["setup_database"],
        base_duration: 240,
        gate: None,
    },
    Blueprint {
        order: 5,
        id: "create_frontend",
        name: "Build frontend",
        description: "Implement pages, components and styling",
        step_type: StepType::Development,
        dependencies: &["create_backend"],
        base_duration: 240,
        gate: None,
    },
    Blueprint {
        order: 6,
        id: "setup_analytics",
        name: "Add analytics",
        description: "Wire visitor analytics into the frontend",
        step_type: StepType::Integration,
        dependencies: &["create_frontend"],
        base_duration: 30,
        gate: Some("analytics"),
    },
    Blueprint {
        order: 7,
        id: "write_tests",
        name: "Write tests",
        description: "Unit, integration and end-to-end test suites",
        step_type: StepType::Testing,
        dependencies: &["create_frontend"],
        base_duration: 120,
        gate: None,
    },
    Blueprint {
        order: 8,
        id: "deploy_site",
        name: "Deploy site",
        description: "Release to hosting and verify the production build",
        step_type: StepType::Deployment,
        dependencies: &["write_tests"],
        base_duration: 60,
        gate: None,
    },
];

const AUTOMATION: &[Blueprint] = &[
    Blueprint {
        order: 1,
        id: "analyze_requirements",
        name: "Analyze requirements",
        description: "Map the manual process and its inputs and outputs",
        step_type: StepType::Analysis,
        dependencies: &[],
        base_duration: 60,
        gate: None,
    },
    Blueprint {
        order: 2,
        id: "design_workflow",
        name: "Design workflow",
        description: "Design triggers, actions and failure handling",
        step_type: StepType::Planning,
        dependencies: &["analyze_requirements"],
        base_duration: 90,
        gate: None,
    },
    Blueprint {
        order: 3,
        id: "setup_environment",
        name: "Set up environment",
        description: "Prepare runtime, credentials and repository",
        step_type: StepType::Setup,
        dependencies: &["design_workflow"],
        base_duration: 45,
        gate: None,
    },
    Blueprint {
        order: 4,
        id: "implement_automation",
        name: "Implement automation",
        description: "Build the workflow steps",
        step_type: StepType::Development,
        dependencies: &["setup_environment"],
        base_duration: 240,
        gate: None,
    },
    Blueprint {
        order: 5,
        id: "integrate_services",
        name: "Integrate services",
        description: "Connect the external systems the workflow drives",
        step_type: StepType::Integration,
        dependencies: &["implement_automation"],
        base_duration: 120,
        gate: None,
    },
    Blueprint {
        order: 6,
        id: "setup_notifications",
        name: "Set up notifications",
        description: "Send run summaries and failure alerts",
        step_type: StepType::Integration,
        dependencies: &["implement_automation"],
        base_duration: 30,
        gate: Some("notifications"),
    },
    Blueprint {
        order: 7,
        id: "setup_monitoring",
        name: "Set up monitoring",
        description: "Dashboards and alerting for workflow health",
        step_type: StepType::Infrastructure,
        dependencies: &["integrate_services"],
        base_duration: 60,
        gate: Some("monitoring"),
    },
    Blueprint {
        order: 8,
        id: "test_automation",
        name: "Test automation",
        description: "Exercise the workflow against staging data",
        step_type: StepType::Testing,
        dependencies: &["integrate_services"],
        base_duration: 90,
        gate: None,
    },
    Blueprint {
        order: 9,
        id: "deploy_automation",
        name: "Deploy automation",
        description: "Schedule the workflow in production",
        step_type: StepType::Deployment,
        dependencies: &["test_automation"],
        base_duration: 60,
        gate: None,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn template(order: u32, id: &str, deps: &[&str], gate: Option<&str>) -> StepTemplate {
        StepTemplate {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: String::new(),
            step_type: StepType::Setup,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            base_duration: 10,
            required: gate.is_none(),
            gate: gate.map(str::to_string),
            order,
        }
    }

    #[test]
    fn test_builtin_templates_are_valid() {
        let store = TemplateStore::builtin();
        for project_type in ProjectType::ALL {
            let steps = store.template_for(project_type).unwrap();
            validate_template(project_type, steps).unwrap();
        }
    }

    #[test]
    fn test_website_starts_with_setup_repo() {
        let store = TemplateStore::builtin();
        let steps = store.template_for(ProjectType::Website).unwrap();
        let first = steps.iter().min_by_key(|s| s.order).unwrap();
        assert_eq!(first.id, "setup_repo");
        assert!(first.dependencies.is_empty());
    }

    #[test]
    fn test_empty_store_rejects_lookup() {
        let store = TemplateStore::empty();
        assert!(matches!(
            store.template_for(ProjectType::Automation),
            Err(EngineError::UnknownProjectType(t)) if t == "automation"
        ));
        assert!(store.project_types().is_empty());
    }

    #[test]
    fn test_validation_rejects_forward_dependency() {
        let steps = vec![template(1, "a", &["b"], None), template(2, "b", &[], None)];
        assert!(validate_template(ProjectType::Website, &steps).is_err());
    }

    #[test]
    fn test_validation_rejects_required_on_optional() {
        let steps = vec![template(1, "a", &[], Some("x")), template(2, "b", &["a"], None)];
        assert!(validate_template(ProjectType::Website, &steps).is_err());
    }

    #[test]
    fn test_from_templates_validates_each_type() {
        let mut templates = HashMap::new();
        templates.insert(
            ProjectType::Automation,
            vec![template(1, "a", &[], None), template(2, "b", &["a"], Some("extra"))],
        );
        let store = TemplateStore::from_templates(templates).unwrap();
        assert_eq!(store.project_types(), vec![ProjectType::Automation]);
        assert_eq!(store.template_for(ProjectType::Automation).unwrap().len(), 2);
        assert!(store.template_for(ProjectType::Website).is_err());

        let mut broken = HashMap::new();
        broken.insert(
            ProjectType::Website,
            vec![template(1, "a", &[], None), template(1, "b", &[], None)],
        );
        assert!(matches!(
            TemplateStore::from_templates(broken),
            Err(EngineError::InvalidInput(msg)) if msg.contains("duplicate order")
        ));
    }

    #[test]
    fn test_gate_marks_step_optional() {
        let store = TemplateStore::builtin();
        let steps = store.template_for(ProjectType::Automation).unwrap();
        let gated: Vec<&str> = steps
            .iter()
            .filter(|s| !s.required)
            .map(|s| s.gate.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(gated, vec!["notifications", "monitoring"]);
    }
}
