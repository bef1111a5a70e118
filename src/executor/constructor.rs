//! Fixture construction
//!
//! Picks one constructor per class by shape preference and remembers the
//! choice for the rest of the run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::lifecycle::panic_message;
use crate::models::{Constructor, EmptyFixture, FixtureRef, TestClass, TestContext, TestError, TestResult};

/// Per-run cache of resolved constructors, keyed by class name
#[derive(Debug, Default)]
pub struct ConstructorCache {
    resolved: Mutex<HashMap<String, Option<usize>>>,
}

impl ConstructorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the constructor used for `class`, `None` when it declares none
    pub fn resolve(&self, class: &TestClass) -> Option<usize> {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        *resolved
            .entry(class.name().to_string())
            .or_insert_with(|| {
                let choice = select(class.constructors());
                debug!(
                    "Resolved constructor for {}: {:?}",
                    class.name(),
                    choice.map(|i| class.constructors()[i].shape())
                );
                choice
            })
    }

    /// Build a fresh fixture of `class` for `context`
    pub fn instantiate(&self, class: &TestClass, context: &TestContext) -> TestResult<FixtureRef> {
        let Some(index) = self.resolve(class) else {
            return Ok(Arc::new(EmptyFixture));
        };
        let constructor = &class.constructors()[index];

        catch_unwind(AssertUnwindSafe(|| constructor.construct(context))).unwrap_or_else(|payload| {
            Err(TestError::assertion(format!(
                "constructor of {} {}",
                class.name(),
                panic_message(payload.as_ref())
            )))
        })
    }
}

/// Most preferred shape; the first declared wins a tie
fn select(constructors: &[Constructor]) -> Option<usize> {
    constructors
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.shape().preference())
        .map(|(i, _)| i)
}
