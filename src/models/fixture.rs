//! Test fixtures and their constructors
//!
//! A fixture is the per-attempt instance of a test's owning class. Classes
//! declare which constructor shapes they support; the engine picks one.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::context::{OutputWriter, TestContext};
use super::error::TestResult;

/// Upcast helper so fixtures can be downcast to their concrete type
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Instance of a test class
#[async_trait]
pub trait TestFixture: AsAny {
    /// Release resources held by the fixture. Called once per instance.
    async fn dispose(&self) -> TestResult {
        Ok(())
    }
}

impl dyn TestFixture {
    pub fn downcast_ref<T: TestFixture>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Shared handle to a fixture
pub type FixtureRef = Arc<dyn TestFixture>;

/// Fixture used by classes that declare no constructor
#[derive(Debug, Default)]
pub struct EmptyFixture;

impl TestFixture for EmptyFixture {}

type ContextOutputFn = dyn Fn(TestContext, OutputWriter) -> TestResult<FixtureRef> + Send + Sync;
type OutputContextFn = dyn Fn(OutputWriter, TestContext) -> TestResult<FixtureRef> + Send + Sync;
type ContextFn = dyn Fn(TestContext) -> TestResult<FixtureRef> + Send + Sync;
type OutputFn = dyn Fn(OutputWriter) -> TestResult<FixtureRef> + Send + Sync;
type DefaultFn = dyn Fn() -> TestResult<FixtureRef> + Send + Sync;

/// Supported constructor shapes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstructorShape {
    ContextAndOutput,
    OutputAndContext,
    Context,
    Output,
    Default,
}

impl ConstructorShape {
    /// Lower is preferred; both two-argument orders rank equally
    pub fn preference(self) -> u8 {
        match self {
            ConstructorShape::ContextAndOutput | ConstructorShape::OutputAndContext => 0,
            ConstructorShape::Context => 1,
            ConstructorShape::Output => 2,
            ConstructorShape::Default => 3,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "context_and_output" => Some(ConstructorShape::ContextAndOutput),
            "output_and_context" => Some(ConstructorShape::OutputAndContext),
            "context" => Some(ConstructorShape::Context),
            "output" => Some(ConstructorShape::Output),
            "default" | "none" => Some(ConstructorShape::Default),
            _ => None,
        }
    }
}

/// One declared way of building a fixture
#[derive(Clone)]
pub enum Constructor {
    ContextAndOutput(Arc<ContextOutputFn>),
    OutputAndContext(Arc<OutputContextFn>),
    Context(Arc<ContextFn>),
    Output(Arc<OutputFn>),
    Default(Arc<DefaultFn>),
}

impl Constructor {
    pub fn context_and_output<F>(f: F) -> Self
    where
        F: Fn(TestContext, OutputWriter) -> TestResult<FixtureRef> + Send + Sync + 'static,
    {
        Constructor::ContextAndOutput(Arc::new(f))
    }

    pub fn output_and_context<F>(f: F) -> Self
    where
        F: Fn(OutputWriter, TestContext) -> TestResult<FixtureRef> + Send + Sync + 'static,
    {
        Constructor::OutputAndContext(Arc::new(f))
    }

    pub fn context<F>(f: F) -> Self
    where
        F: Fn(TestContext) -> TestResult<FixtureRef> + Send + Sync + 'static,
    {
        Constructor::Context(Arc::new(f))
    }

    pub fn output<F>(f: F) -> Self
    where
        F: Fn(OutputWriter) -> TestResult<FixtureRef> + Send + Sync + 'static,
    {
        Constructor::Output(Arc::new(f))
    }

    pub fn default_with<F>(f: F) -> Self
    where
        F: Fn() -> TestResult<FixtureRef> + Send + Sync + 'static,
    {
        Constructor::Default(Arc::new(f))
    }

    pub fn shape(&self) -> ConstructorShape {
        match self {
            Constructor::ContextAndOutput(_) => ConstructorShape::ContextAndOutput,
            Constructor::OutputAndContext(_) => ConstructorShape::OutputAndContext,
            Constructor::Context(_) => ConstructorShape::Context,
            Constructor::Output(_) => ConstructorShape::Output,
            Constructor::Default(_) => ConstructorShape::Default,
        }
    }

    /// Build a fixture, feeding it the parts of `context` its shape asks for
    pub fn construct(&self, context: &TestContext) -> TestResult<FixtureRef> {
        match self {
            Constructor::ContextAndOutput(f) => f(context.clone(), context.output().clone()),
            Constructor::OutputAndContext(f) => f(context.output().clone(), context.clone()),
            Constructor::Context(f) => f(context.clone()),
            Constructor::Output(f) => f(context.output().clone()),
            Constructor::Default(f) => f(),
        }
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor({:?})", self.shape())
    }
}

/// Owning class of a test case
#[derive(Clone, Debug)]
pub struct TestClass {
    name: String,
    constructors: Vec<Constructor>,
}

impl TestClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructors: Vec::new(),
        }
    }

    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }
}
