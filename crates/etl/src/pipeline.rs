use tracing::{debug, info};
use warehouse_db::{Db, Value};

use crate::error::{PipelineError, Result};
use crate::params::PipelineParams;

/// Runs named pipeline sections, in order, against the warehouse database.
pub trait PipelineRunner {
    fn run(&mut self, db: &mut Db, sections: &[&str], params: &PipelineParams) -> Result<()>;
}

/// One step of a pipeline section.
pub trait EtlAction {
    fn name(&self) -> &str;

    /// Parameters that must be present for the action to run.
    fn required_params(&self) -> &[&'static str] {
        &[]
    }

    fn execute(&self, db: &mut Db, params: &PipelineParams) -> Result<()>;
}

/// Action made of SQL statements bound to the pipeline parameters.
pub struct SqlAction {
    name: String,
    statements: Vec<String>,
    required: Vec<&'static str>,
}

impl SqlAction {
    pub fn new(name: impl Into<String>, statements: &[&str]) -> Self {
        Self {
            name: name.into(),
            statements: statements.iter().map(|sql| sql.to_string()).collect(),
            required: Vec::new(),
        }
    }

    pub fn requires(mut self, params: &[&'static str]) -> Self {
        self.required.extend_from_slice(params);
        self
    }
}

impl EtlAction for SqlAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_params(&self) -> &[&'static str] {
        &self.required
    }

    fn execute(&self, db: &mut Db, params: &PipelineParams) -> Result<()> {
        let named = params.to_named();
        let bound: Vec<(&str, Value)> = named
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();
        for sql in &self.statements {
            let affected = db.execute_named(sql, &bound)?;
            debug!(action = %self.name, affected, "Executed statement");
        }
        Ok(())
    }
}

pub struct Section {
    name: String,
    actions: Vec<Box<dyn EtlAction>>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: impl EtlAction + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|action| action.name())
    }
}

/// Pipeline of registered sections, each run in its own transaction.
#[derive(Default)]
pub struct SqlPipeline {
    sections: Vec<Section>,
}

impl SqlPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, section: Section) -> Self {
        self.add_section(section);
        self
    }

    /// Registers a section, replacing one with the same name.
    pub fn add_section(&mut self, section: Section) {
        self.sections.retain(|existing| existing.name != section.name);
        self.sections.push(section);
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(Section::name)
    }

    fn find(&self, name: &str) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| section.name == name)
            .ok_or_else(|| PipelineError::UnknownSection(name.to_string()))
    }

    fn run_section(section: &Section, db: &mut Db, params: &PipelineParams) -> Result<()> {
        info!(section = %section.name, "Running pipeline section");
        db.transaction(|db| {
            for action in &section.actions {
                let stage = |source: PipelineError| PipelineError::Stage {
                    section: section.name.clone(),
                    action: action.name().to_string(),
                    source: Box::new(source),
                };
                for name in action.required_params() {
                    if !params.contains(name) {
                        return Err(stage(PipelineError::MissingParameter {
                            action: action.name().to_string(),
                            name: name.to_string(),
                        }));
                    }
                }
                debug!(section = %section.name, action = action.name(), "Running action");
                action.execute(db, params).map_err(stage)?;
            }
            Ok(())
        })
    }
}

impl PipelineRunner for SqlPipeline {
    fn run(&mut self, db: &mut Db, sections: &[&str], params: &PipelineParams) -> Result<()> {
        let resolved = sections
            .iter()
            .map(|name| self.find(name))
            .collect::<Result<Vec<_>>>()?;
        for section in resolved {
            Self::run_section(section, db, params)?;
        }
        Ok(())
    }
}
