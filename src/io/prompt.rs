//! Prompt templates for the agent roles.
//!
//! Each loop phase composes a role-specific task text, and every invocation
//! wraps system/context/task in an explicit envelope. The envelope markers
//! double as leak detectors: their literal presence in a returned diff means
//! the model echoed its prompt, and sanitization rejects it.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::AgentRole;

const ENVELOPE_TEMPLATE: &str = include_str!("../prompts/envelope.md");
const TEST_TASK_TEMPLATE: &str = include_str!("../prompts/test_task.md");
const DIAGNOSE_TASK_TEMPLATE: &str = include_str!("../prompts/diagnose_task.md");
const IMPLEMENT_TASK_TEMPLATE: &str = include_str!("../prompts/implement_task.md");
const REVIEW_TASK_TEMPLATE: &str = include_str!("../prompts/review_task.md");

const PLANNER_SYSTEM: &str = include_str!("../prompts/planner.md");
const TEST_WRITER_SYSTEM: &str = include_str!("../prompts/test_writer.md");
const DIAGNOSER_SYSTEM: &str = include_str!("../prompts/diagnoser.md");
const IMPLEMENTER_SYSTEM: &str = include_str!("../prompts/implementer.md");
const REVIEWER_SYSTEM: &str = include_str!("../prompts/reviewer.md");

/// Embedded system prompt for a role.
pub fn system_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Planner => PLANNER_SYSTEM,
        AgentRole::TestWriter => TEST_WRITER_SYSTEM,
        AgentRole::Diagnoser => DIAGNOSER_SYSTEM,
        AgentRole::Implementer => IMPLEMENTER_SYSTEM,
        AgentRole::Reviewer => REVIEWER_SYSTEM,
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("envelope", ENVELOPE_TEMPLATE)
            .expect("envelope template should be valid");
        env.add_template("test_task", TEST_TASK_TEMPLATE)
            .expect("test task template should be valid");
        env.add_template("diagnose_task", DIAGNOSE_TASK_TEMPLATE)
            .expect("diagnose task template should be valid");
        env.add_template("implement_task", IMPLEMENT_TASK_TEMPLATE)
            .expect("implement task template should be valid");
        env.add_template("review_task", REVIEW_TASK_TEMPLATE)
            .expect("review task template should be valid");
        Self { env }
    }

    /// Wrap system/context/task in the prompt envelope.
    pub fn envelope(&self, system: &str, context_text: &str, task: &str) -> Result<String> {
        let template = self.env.get_template("envelope").context("get envelope")?;
        let rendered = template
            .render(context! {
                system => system.trim(),
                context => context_text.trim(),
                task => task.trim(),
            })
            .context("render envelope")?;
        Ok(rendered)
    }

    pub fn test_task(&self, task: &str, plan: &str) -> Result<String> {
        let template = self.env.get_template("test_task").context("get test_task")?;
        Ok(template
            .render(context! { task => task, plan => plan.trim() })
            .context("render test_task")?)
    }

    pub fn diagnose_task(&self, transcript: &str) -> Result<String> {
        let template = self
            .env
            .get_template("diagnose_task")
            .context("get diagnose_task")?;
        Ok(template
            .render(context! { transcript => transcript })
            .context("render diagnose_task")?)
    }

    pub fn implement_task(
        &self,
        task: &str,
        plan: &str,
        diagnosis: &str,
        transcript: &str,
    ) -> Result<String> {
        let template = self
            .env
            .get_template("implement_task")
            .context("get implement_task")?;
        Ok(template
            .render(context! {
                task => task,
                plan => plan.trim(),
                diagnosis => diagnosis.trim(),
                transcript => transcript,
            })
            .context("render implement_task")?)
    }

    pub fn review_task(&self) -> Result<String> {
        let template = self
            .env
            .get_template("review_task")
            .context("get review_task")?;
        Ok(template.render(context! {}).context("render review_task")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wraps_all_three_sections() {
        let engine = PromptEngine::new();
        let prompt = engine
            .envelope("be helpful", "project facts", "add subtraction")
            .expect("render");
        assert!(prompt.contains("<SYSTEM>\nbe helpful\n</SYSTEM>"));
        assert!(prompt.contains("<CONTEXT>\nproject facts\n</CONTEXT>"));
        assert!(prompt.contains("<TASK>\nadd subtraction\n</TASK>"));
    }

    #[test]
    fn test_task_includes_task_and_plan() {
        let engine = PromptEngine::new();
        let rendered = engine
            .test_task("add subtraction", "1. write tests\n2. implement")
            .expect("render");
        assert!(rendered.contains("TASK: add subtraction"));
        assert!(rendered.contains("1. write tests"));
        assert!(rendered.contains("unified diff"));
    }

    #[test]
    fn implement_task_carries_diagnosis_and_logs() {
        let engine = PromptEngine::new();
        let rendered = engine
            .implement_task("task", "plan", "off-by-one in add", "$ pytest\n1 failed")
            .expect("render");
        assert!(rendered.contains("off-by-one in add"));
        assert!(rendered.contains("1 failed"));
    }

    #[test]
    fn every_role_has_a_system_prompt() {
        for role in [
            AgentRole::Planner,
            AgentRole::TestWriter,
            AgentRole::Diagnoser,
            AgentRole::Implementer,
            AgentRole::Reviewer,
        ] {
            assert!(!system_prompt(role).trim().is_empty());
        }
    }
}
