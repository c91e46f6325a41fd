//! Recording deployer fake.

use std::sync::Mutex;

use async_trait::async_trait;

use hatchery::environment::Component;
use hatchery::error::{EnvError, Result};
use hatchery::manifest::{ChartOutput, Deployer, ManifestOutput};

/// Deployer that records apply order and optionally fails one
/// component, binding everything else to a [`ChartOutput`].
#[derive(Debug, Default)]
pub struct FakeDeployer {
    applied: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl FakeDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the apply of the named component.
    pub fn failing_on(component: &str) -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            fail_on: Some(component.to_string()),
        }
    }

    /// Component names in the order they were applied.
    pub fn applied(&self) -> Vec<String> {
        self.applied
            .lock()
            .expect("fake deployer lock poisoned")
            .clone()
    }
}

#[async_trait]
impl Deployer for FakeDeployer {
    async fn apply(
        &self,
        namespace: &str,
        component: &Component,
    ) -> Result<Box<dyn ManifestOutput>> {
        self.applied
            .lock()
            .expect("fake deployer lock poisoned")
            .push(component.name.clone());
        if self.fail_on.as_deref() == Some(component.name.as_str()) {
            return Err(EnvError::Deploy {
                component: component.name.clone(),
                message: "scripted deploy failure".to_string(),
            });
        }
        Ok(Box::new(ChartOutput::new(namespace, component)))
    }
}
