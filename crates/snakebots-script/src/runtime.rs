use std::fmt;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FLOAT, Map, Scope};
use snakebots_core::{
    Decision, DecisionBackend, DecisionError, Perception, RuntimeState, ScriptSettings,
};
use tracing::debug;

use crate::PRELUDE;
use crate::capabilities::{Capabilities, PerceptionSlot, number};
use crate::quota::{Armed, Deadline};

/// Name of the zero-argument function every agent script must define.
pub const ENTRY_POINT: &str = "step";

/// Engine, compiled program and persistent state of a ready runtime.
struct Loaded {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    self_map: Map,
    slot: PerceptionSlot,
    deadline: Arc<Deadline>,
}

/// Clears the perception slot when an invocation ends, however it ends.
struct Published<'a>(&'a PerceptionSlot);

impl<'a> Published<'a> {
    fn new(slot: &'a PerceptionSlot, perception: &Perception) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(perception.clone());
        Self(slot)
    }
}

impl Drop for Published<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Sandboxed rhai runtime driving one agent.
///
/// Each runtime owns its engine, quota and deadline, so runtimes can be stepped from
/// different threads without affecting one another.
pub struct ScriptRuntime {
    name: Arc<str>,
    source: Arc<str>,
    settings: ScriptSettings,
    rng_seed: Option<u64>,
    created: Instant,
    state: RuntimeState,
    loaded: Option<Loaded>,
}

impl fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("source_len", &self.source.len())
            .finish()
    }
}

impl ScriptRuntime {
    /// Create an uninitialized runtime; the script is compiled on first use.
    pub fn new(
        name: impl Into<Arc<str>>,
        source: impl Into<Arc<str>>,
        settings: ScriptSettings,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            settings,
            rng_seed: None,
            created: Instant::now(),
            state: RuntimeState::Uninitialized,
            loaded: None,
        }
    }

    /// Seed `math::random` for reproducible runs.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The persistent `this` map, once the runtime has loaded.
    #[must_use]
    pub fn self_map(&self) -> Option<&Map> {
        self.loaded.as_ref().map(|loaded| &loaded.self_map)
    }

    fn budget(&self) -> Duration {
        Duration::from_millis(self.settings.time_budget_ms)
    }

    fn load(&self) -> Result<Loaded, DecisionError> {
        let slot = PerceptionSlot::default();
        let deadline = Arc::new(Deadline::new());
        let engine = Capabilities {
            agent_name: Arc::clone(&self.name),
            settings: self.settings.clone(),
            slot: Arc::clone(&slot),
            deadline: Arc::clone(&deadline),
            rng_seed: self.rng_seed.unwrap_or_else(rand::random),
            origin: self.created,
        }
        .into_engine();

        let prelude = engine
            .compile(PRELUDE)
            .map_err(|err| DecisionError::ScriptLoad(format!("support prelude: {err}")))?;
        let script = engine
            .compile(self.source.as_ref())
            .map_err(|err| DecisionError::ScriptLoad(err.to_string()))?;
        let ast = prelude.merge(&script);
        if !ast
            .iter_functions()
            .any(|func| func.name == ENTRY_POINT && func.params.is_empty())
        {
            return Err(DecisionError::ScriptLoad(format!(
                "script does not define `fn {ENTRY_POINT}()`"
            )));
        }

        let mut scope = Scope::new();
        {
            let _armed = Armed::new(&deadline, self.budget());
            engine
                .run_ast_with_scope(&mut scope, &ast)
                .map_err(|err| classify(err, true))?;
        }

        Ok(Loaded {
            engine,
            ast,
            scope,
            self_map: Map::new(),
            slot,
            deadline,
        })
    }

    fn invoke(&mut self, perception: &Perception) -> Result<Decision, DecisionError> {
        let budget = self.budget();
        let loaded = self.loaded.as_mut().ok_or(DecisionError::Faulted)?;

        loaded
            .self_map
            .insert("id".into(), Dynamic::from(perception.guid().to_string()));
        loaded.self_map.insert(
            "r".into(),
            Dynamic::from(perception.segment_radius() as FLOAT),
        );
        let mut this = Dynamic::from_map(std::mem::take(&mut loaded.self_map));

        let result = {
            let _published = Published::new(&loaded.slot, perception);
            let _armed = Armed::new(&loaded.deadline, budget);
            let options = CallFnOptions::new()
                .eval_ast(false)
                .rewind_scope(true)
                .bind_this_ptr(&mut this);
            loaded.engine.call_fn_with_options::<Dynamic>(
                options,
                &mut loaded.scope,
                &loaded.ast,
                ENTRY_POINT,
                (),
            )
        };
        loaded.self_map = this.try_cast::<Map>().unwrap_or_default();

        decode(result.map_err(|err| classify(err, false))?)
    }

    fn fault(&mut self, err: &DecisionError) {
        self.state = RuntimeState::Faulted;
        debug!(agent = %self.name, %err, "script runtime faulted");
    }
}

impl DecisionBackend for ScriptRuntime {
    fn kind(&self) -> &'static str {
        "rhai"
    }

    fn state(&self) -> RuntimeState {
        self.state
    }

    fn initialize(&mut self) -> Result<(), DecisionError> {
        match self.load() {
            Ok(loaded) => {
                self.loaded = Some(loaded);
                self.state = RuntimeState::Ready;
                debug!(agent = %self.name, "script runtime ready");
                Ok(())
            }
            Err(err) => {
                self.loaded = None;
                self.fault(&err);
                Err(err)
            }
        }
    }

    fn step(&mut self, perception: &Perception) -> Result<Decision, DecisionError> {
        match self.state {
            RuntimeState::Faulted => return Err(DecisionError::Faulted),
            RuntimeState::Uninitialized => self.initialize()?,
            RuntimeState::Ready => {}
        }
        self.invoke(perception).inspect_err(|err| self.fault(err))
    }

    fn reset(&mut self) {
        self.loaded = None;
        self.state = RuntimeState::Uninitialized;
    }
}

fn root_cause(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => root_cause(inner),
        other => other,
    }
}

fn classify(err: Box<EvalAltResult>, loading: bool) -> DecisionError {
    let message = err.to_string();
    match root_cause(&err) {
        EvalAltResult::ErrorTooManyOperations(_)
        | EvalAltResult::ErrorTerminated(..)
        | EvalAltResult::ErrorStackOverflow(_)
        | EvalAltResult::ErrorDataTooLarge(..) => DecisionError::QuotaExceeded(message),
        _ if loading => DecisionError::ScriptLoad(message),
        _ => DecisionError::ScriptRuntime(message),
    }
}

/// Turn the value returned by `step()` into a decision.
fn decode(value: Dynamic) -> Result<Decision, DecisionError> {
    if let Some(delta) = number(&value) {
        return finite_heading(delta).map(Decision::turn);
    }
    let type_name = value.type_name();
    let Some(map) = value.try_cast::<Map>() else {
        return Err(DecisionError::ScriptRuntime(format!(
            "{ENTRY_POINT}() must return a number or #{{heading, boost}}, got {type_name}"
        )));
    };
    let heading = map
        .get("heading")
        .and_then(number)
        .ok_or_else(|| {
            DecisionError::ScriptRuntime("returned map has no numeric `heading`".into())
        })?;
    let boost = match map.get("boost") {
        None => false,
        Some(flag) => flag.as_bool().map_err(|_| {
            DecisionError::ScriptRuntime("`boost` must be a boolean".into())
        })?,
    };
    Ok(Decision {
        heading_delta: finite_heading(heading)?,
        boost,
    })
}

fn finite_heading(value: FLOAT) -> Result<f32, DecisionError> {
    let heading = value as f32;
    if heading.is_finite() {
        Ok(heading)
    } else {
        Err(DecisionError::ScriptRuntime(
            "heading must be a finite number".into(),
        ))
    }
}
