//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - templates: Show the step template for a project type
//! - plan: Create a project and print its plan
//! - run: Run the whole pipeline for a new project
//! - config show / validate

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::cli::ProjectArgs;
use crate::conductor::{ExecutionReport, Orchestrator, TemplateStore};
use crate::config::Config;
use crate::telemetry::MemorySink;
use sdk::requirements::Requirements;
use sdk::types::{ExecutionPlan, ProjectStatus, ProjectType};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Parse repeated `key=value` flags into a requirement map
pub fn parse_requirements(raw: &[String]) -> Result<Requirements> {
    let mut requirements = Requirements::new();
    for assignment in raw {
        let (key, value) = Requirements::parse_assignment(assignment)
            .with_context(|| format!("Invalid requirement '{}', expected key=value", assignment))?;
        requirements.insert(key, value);
    }
    Ok(requirements)
}

/// Orchestrator with the built-in agents and an in-memory telemetry buffer
pub async fn build_orchestrator(config: &Config) -> Orchestrator {
    let telemetry = Arc::new(MemorySink::new(config.telemetry.buffer_capacity));
    Orchestrator::with_default_agents(config, telemetry).await
}

/// Show the step template for a project type
pub async fn handle_templates(project_type: &str, format: OutputFormat) -> Result<()> {
    let project_type: ProjectType = project_type.parse()?;
    let store = TemplateStore::builtin();
    let steps = store.template_for(project_type)?;

    match format {
        OutputFormat::Text => {
            println!("{} template ({} steps):", project_type, steps.len());
            println!();
            for step in steps {
                let gate = match &step.gate {
                    Some(key) => format!(" [optional, requires {}]", key),
                    None => String::new(),
                };
                println!(
                    "  {:>2}. {:<22} {:<15} {:>4} min{}",
                    step.order, step.id, step.step_type.as_str(), step.base_duration, gate
                );
                if !step.dependencies.is_empty() {
                    println!("      after: {}", step.dependencies.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "project_type": project_type,
                "steps": steps,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Create a project and print the plan generated for it
pub async fn handle_plan(
    project_type: &str,
    args: &ProjectArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let requirements = parse_requirements(&args.requirements)?;
    let orchestrator = build_orchestrator(config).await;

    let project = orchestrator
        .create_project_with_requirements(&args.name, project_type, &args.description, requirements)
        .await?;
    let plan = orchestrator.generate_execution_plan(&project.id).await?;

    match format {
        OutputFormat::Text => {
            println!("Project: {} ({})", project.name, project.id);
            print_plan(&plan);
        }
        OutputFormat::Json => {
            let output = json!({
                "project": project,
                "plan": plan,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

/// Create, start, plan, execute and validate a project
pub async fn handle_run(
    project_type: &str,
    args: &ProjectArgs,
    parallel: Option<usize>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(parallel) = parallel {
        config.orchestrator.max_parallel_steps = parallel;
        config.validate()?;
    }

    let requirements = parse_requirements(&args.requirements)?;
    let orchestrator = build_orchestrator(&config).await;

    let project = orchestrator
        .create_project_with_requirements(&args.name, project_type, &args.description, requirements)
        .await?;
    orchestrator.start_project(&project.id).await?;
    let plan = orchestrator.generate_execution_plan(&project.id).await?;

    if let OutputFormat::Text = format {
        println!("Project: {} ({})", project.name, project.id);
        print_plan(&plan);
        println!();
        println!("Executing...");
    }

    let report = orchestrator.execute_project_plan(&project.id).await?;
    let succeeded = report.project_status == ProjectStatus::Completed;

    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    orchestrator.shutdown().await;

    if succeeded {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Project {} ended {}", project.id, report.project_status))
    }
}

fn print_plan(plan: &ExecutionPlan) {
    println!(
        "Plan {} ({} steps, {} min estimated)",
        plan.id,
        plan.steps.len(),
        plan.total_estimated_duration
    );
    println!();
    for step in plan.ordered_steps() {
        let optional = if step.required { "" } else { " (optional)" };
        println!(
            "  {:>2}. {:<24} {:<15} {:>4} min{}",
            step.order, step.template_id, step.step_type.as_str(), step.estimated_duration, optional
        );
    }
}

fn print_report(report: &ExecutionReport) {
    println!();
    for step in report.plan.ordered_steps() {
        let mark = match step.status {
            sdk::types::StepStatus::Completed => "✓",
            sdk::types::StepStatus::Skipped => "-",
            _ => "✗",
        };
        let score = step
            .metadata
            .get("review_score")
            .map(|s| format!(" (review {})", s))
            .unwrap_or_default();
        println!("  {} {:<24} {}{}", mark, step.template_id, step.status.as_str(), score);
        if let Some(error) = &step.error {
            println!("      {}", error);
        }
    }
    println!();

    if report.project_status == ProjectStatus::Completed {
        println!("✓ Project completed");
    } else {
        println!("✗ Project {}", report.project_status);
    }
    println!("  Plan: {}", report.plan_status);

    if let Some(validation) = &report.validation {
        let verdict = if validation.passed { "passed" } else { "failed" };
        println!("  Validation: {} ({}/100)", verdict, validation.score);
        for issue in &validation.issues {
            println!("    - {}", issue);
        }
        for recommendation in &validation.recommendations {
            println!("    > {}", recommendation);
        }
    }
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", toml::to_string_pretty(config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

/// Load and validate a configuration file without using it
pub fn handle_config_validate(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path()?,
    };
    let result = Config::load_from_path(&path);

    match format {
        OutputFormat::Text => match &result {
            Ok(_) => println!("✓ {} is valid", path.display()),
            Err(e) => println!("✗ {}: {}", path.display(), e),
        },
        OutputFormat::Json => {
            let output = json!({
                "path": path,
                "valid": result.is_ok(),
                "error": result.as_ref().err().map(|e| e.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    result.map(|_| ()).map_err(Into::into)
}
