//! The complete set of host functions a snake script can reach.
//!
//! Everything is registered on an [`Engine::new_raw`] engine, so nothing outside this file
//! (no file system, no module imports, no `eval`) is available to scripts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FLOAT, INT, ImmutableString, Map, Module, Position};
use snakebots_core::{FoodSighting, Perception, ScriptSettings, SegmentSighting};
use tracing::{debug, info};

use crate::quota::{self, Deadline};

/// Perception of the agent currently being stepped; empty outside of an invocation.
pub(crate) type PerceptionSlot = Arc<Mutex<Option<Perception>>>;

pub(crate) const SCRIPT_TARGET: &str = "snakebots::script";

pub(crate) type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

pub(crate) fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        message.into().into(),
        Position::NONE,
    ))
}

/// Numeric value of a script argument, accepting both integers and floats.
pub(crate) fn number(value: &Dynamic) -> Option<FLOAT> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as FLOAT))
}

fn float_arg(value: &Dynamic, func: &str) -> ScriptResult<FLOAT> {
    number(value).ok_or_else(|| {
        runtime_error(format!(
            "{func} expects a number, got {}",
            value.type_name()
        ))
    })
}

fn int_arg(value: &Dynamic, func: &str) -> ScriptResult<INT> {
    let n = float_arg(value, func)?;
    if !n.is_finite() {
        return Err(runtime_error(format!("{func} expects a finite number")));
    }
    Ok(n.floor() as INT)
}

/// Everything one runtime's engine closes over.
pub(crate) struct Capabilities {
    pub(crate) agent_name: Arc<str>,
    pub(crate) settings: ScriptSettings,
    pub(crate) slot: PerceptionSlot,
    pub(crate) deadline: Arc<Deadline>,
    pub(crate) rng_seed: u64,
    pub(crate) origin: Instant,
}

impl Capabilities {
    /// Build a sandboxed engine exposing exactly this registry.
    pub(crate) fn into_engine(self) -> Engine {
        let mut engine = Engine::new_raw();
        engine.disable_symbol("eval");
        engine.set_module_resolver(DummyModuleResolver::new());
        quota::apply_limits(&mut engine, &self.settings, Arc::clone(&self.deadline));

        register_language_support(&mut engine);
        engine.register_static_module("math", math_module(self.rng_seed).into());
        engine.register_static_module("string", string_module(self.settings.max_string_size).into());
        engine.register_static_module("os", os_module(self.origin).into());
        self.register_logging(&mut engine);
        self.register_sensing(&mut engine);
        engine
    }

    fn register_logging(&self, engine: &mut Engine) {
        let max_line = self.settings.max_log_line;
        let name = Arc::clone(&self.agent_name);
        engine.register_fn("log", move |value: Dynamic| {
            let line = bounded_line(&value.to_string(), max_line);
            info!(target: SCRIPT_TARGET, agent = %name, "{line}");
        });

        let name = Arc::clone(&self.agent_name);
        engine.on_print(move |text| {
            let line = bounded_line(text, max_line);
            info!(target: SCRIPT_TARGET, agent = %name, "{line}");
        });
        let name = Arc::clone(&self.agent_name);
        engine.on_debug(move |text, _source, pos| {
            let line = bounded_line(text, max_line);
            debug!(target: SCRIPT_TARGET, agent = %name, %pos, "{line}");
        });
    }

    fn register_sensing(&self, engine: &mut Engine) {
        let limit = self.settings.max_array_size;

        let slot = Arc::clone(&self.slot);
        engine.register_fn(
            "findFood",
            move |radius: Dynamic, min_size: Dynamic| -> ScriptResult<Array> {
                let radius = float_arg(&radius, "findFood")?;
                let min_size = float_arg(&min_size, "findFood")?;
                let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let perception = guard
                    .as_ref()
                    .ok_or_else(|| runtime_error("findFood is only available inside step()"))?;
                Ok(perception
                    .find_food(radius as f32, min_size as f32)
                    .iter()
                    .take(limit)
                    .map(food_map)
                    .collect())
            },
        );

        let slot = Arc::clone(&self.slot);
        engine.register_fn(
            "findSegments",
            move |radius: Dynamic, include_self: bool| -> ScriptResult<Array> {
                let radius = float_arg(&radius, "findSegments")?;
                let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let perception = guard
                    .as_ref()
                    .ok_or_else(|| runtime_error("findSegments is only available inside step()"))?;
                Ok(perception
                    .find_segments(radius as f32, include_self)
                    .iter()
                    .take(limit)
                    .map(segment_map)
                    .collect())
            },
        );
    }
}

fn bounded_line(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let mut line: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        line.push('…');
    }
    line
}

fn food_map(food: &FoodSighting) -> Dynamic {
    let mut map = Map::new();
    map.insert("x".into(), (food.offset.dx as FLOAT).into());
    map.insert("y".into(), (food.offset.dy as FLOAT).into());
    map.insert("v".into(), (food.value as FLOAT).into());
    map.insert("d".into(), (food.direction as FLOAT).into());
    map.insert("dist".into(), (food.distance as FLOAT).into());
    Dynamic::from_map(map)
}

fn segment_map(segment: &SegmentSighting) -> Dynamic {
    let mut map = Map::new();
    map.insert("x".into(), (segment.offset.dx as FLOAT).into());
    map.insert("y".into(), (segment.offset.dy as FLOAT).into());
    map.insert("r".into(), (segment.radius as FLOAT).into());
    map.insert("d".into(), (segment.direction as FLOAT).into());
    map.insert("dist".into(), (segment.distance as FLOAT).into());
    map.insert("bot".into(), Dynamic::from(segment.owner_guid.to_string()));
    Dynamic::from_map(map)
}

/// Minimal language surface a raw engine lacks: iteration, lengths, conversions.
fn register_language_support(engine: &mut Engine) {
    engine.register_iterator::<Array>();
    engine.register_iterator::<std::ops::Range<INT>>();
    engine.register_iterator::<std::ops::RangeInclusive<INT>>();

    engine.register_fn("len", |items: &mut Array| items.len() as INT);
    engine.register_fn("len", |map: &mut Map| map.len() as INT);
    engine.register_fn("len", |text: &mut ImmutableString| text.chars().count() as INT);
    engine.register_fn("push", |items: &mut Array, value: Dynamic| items.push(value));

    engine.register_fn("to_string", |value: INT| value.to_string());
    engine.register_fn("to_string", |value: FLOAT| value.to_string());
    engine.register_fn("to_string", |value: bool| value.to_string());
    engine.register_fn("to_string", |value: ImmutableString| value);

    engine.register_fn("+", |text: ImmutableString, value: INT| format!("{text}{value}"));
    engine.register_fn("+", |text: ImmutableString, value: FLOAT| format!("{text}{value}"));
    engine.register_fn("+", |text: ImmutableString, value: bool| format!("{text}{value}"));
    engine.register_fn("+", |value: INT, text: ImmutableString| format!("{value}{text}"));
    engine.register_fn("+", |value: FLOAT, text: ImmutableString| format!("{value}{text}"));
}

fn unary(module: &mut Module, name: &'static str, op: fn(FLOAT) -> FLOAT) {
    module.set_native_fn(name, move |x: Dynamic| -> ScriptResult<FLOAT> {
        Ok(op(float_arg(&x, name)?))
    });
}

fn binary(module: &mut Module, name: &'static str, op: fn(FLOAT, FLOAT) -> FLOAT) {
    module.set_native_fn(name, move |a: Dynamic, b: Dynamic| -> ScriptResult<FLOAT> {
        Ok(op(float_arg(&a, name)?, float_arg(&b, name)?))
    });
}

fn math_module(seed: u64) -> Module {
    let mut module = Module::new();
    module.set_var("pi", std::f64::consts::PI as FLOAT);
    module.set_var("huge", FLOAT::INFINITY);

    unary(&mut module, "abs", |x| x.abs());
    unary(&mut module, "acos", |x| x.acos());
    unary(&mut module, "asin", |x| x.asin());
    unary(&mut module, "atan", |x| x.atan());
    unary(&mut module, "ceil", |x| x.ceil());
    unary(&mut module, "cos", |x| x.cos());
    unary(&mut module, "cosh", |x| x.cosh());
    unary(&mut module, "deg", |x| x.to_degrees());
    unary(&mut module, "exp", |x| x.exp());
    unary(&mut module, "floor", |x| x.floor());
    unary(&mut module, "log", |x| x.ln());
    unary(&mut module, "log10", |x| x.log10());
    unary(&mut module, "rad", |x| x.to_radians());
    unary(&mut module, "sin", |x| x.sin());
    unary(&mut module, "sinh", |x| x.sinh());
    unary(&mut module, "sqrt", |x| x.sqrt());
    unary(&mut module, "tan", |x| x.tan());
    unary(&mut module, "tanh", |x| x.tanh());
    binary(&mut module, "atan2", |y, x| y.atan2(x));
    binary(&mut module, "fmod", |a, b| a % b);
    binary(&mut module, "max", FLOAT::max);
    binary(&mut module, "min", FLOAT::min);
    binary(&mut module, "pow", FLOAT::powf);

    module.set_native_fn("frexp", |x: Dynamic| -> ScriptResult<Array> {
        let (mantissa, exponent) = frexp(float_arg(&x, "frexp")?);
        Ok(vec![Dynamic::from(mantissa), Dynamic::from(exponent)])
    });
    module.set_native_fn("ldexp", |m: Dynamic, e: Dynamic| -> ScriptResult<FLOAT> {
        Ok(ldexp(float_arg(&m, "ldexp")?, int_arg(&e, "ldexp")?))
    });
    module.set_native_fn("modf", |x: Dynamic| -> ScriptResult<Array> {
        let x = float_arg(&x, "modf")?;
        let whole = x.trunc();
        let fraction = if x.is_infinite() { 0.0 } else { x - whole };
        Ok(vec![Dynamic::from(whole), Dynamic::from(fraction)])
    });

    let rng = Arc::new(Mutex::new(SmallRng::seed_from_u64(seed)));
    let shared = Arc::clone(&rng);
    module.set_native_fn("random", move || -> ScriptResult<FLOAT> {
        let mut rng = shared.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rng.random::<FLOAT>())
    });
    let shared = Arc::clone(&rng);
    module.set_native_fn("random", move |upper: Dynamic| -> ScriptResult<INT> {
        let upper = int_arg(&upper, "random")?;
        if upper < 1 {
            return Err(runtime_error("random: interval is empty"));
        }
        let mut rng = shared.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rng.random_range(1..=upper))
    });
    module.set_native_fn("random", move |lower: Dynamic, upper: Dynamic| -> ScriptResult<INT> {
        let lower = int_arg(&lower, "random")?;
        let upper = int_arg(&upper, "random")?;
        if lower > upper {
            return Err(runtime_error("random: interval is empty"));
        }
        let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rng.random_range(lower..=upper))
    });
    module
}

/// Split `x` into a mantissa in `[0.5, 1)` (by magnitude) and a power of two.
fn frexp(x: FLOAT) -> (FLOAT, INT) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let mut exponent = x.abs().log2().floor() as INT + 1;
    let mut mantissa = ldexp(x, -exponent);
    // log2 rounding can land one binade off.
    if mantissa.abs() >= 1.0 {
        mantissa /= 2.0;
        exponent += 1;
    } else if mantissa.abs() < 0.5 {
        mantissa *= 2.0;
        exponent -= 1;
    }
    (mantissa, exponent)
}

fn ldexp(mantissa: FLOAT, exponent: INT) -> FLOAT {
    // Two steps keep 2^exponent representable across the subnormal range.
    let exponent = exponent.clamp(-2_200, 2_200) as i32;
    let half = exponent / 2;
    mantissa * (2.0 as FLOAT).powi(half) * (2.0 as FLOAT).powi(exponent - half)
}

fn string_module(max_size: usize) -> Module {
    let mut module = Module::new();
    module.set_native_fn(
        "format",
        move |template: ImmutableString, value: Dynamic| -> ScriptResult<String> {
            let text = template.replacen("{}", &value.to_string(), 1);
            if text.len() > max_size {
                return Err(Box::new(EvalAltResult::ErrorDataTooLarge(
                    "Length of string".into(),
                    Position::NONE,
                )));
            }
            Ok(text)
        },
    );
    module.set_native_fn(
        "sub",
        |text: ImmutableString, start: Dynamic, len: Dynamic| -> ScriptResult<String> {
            let start = int_arg(&start, "sub")?.max(0) as usize;
            let len = int_arg(&len, "sub")?.max(0) as usize;
            Ok(text.chars().skip(start).take(len).collect::<String>())
        },
    );
    module.set_native_fn("upper", |text: ImmutableString| -> ScriptResult<String> {
        Ok(text.to_uppercase())
    });
    module.set_native_fn("lower", |text: ImmutableString| -> ScriptResult<String> {
        Ok(text.to_lowercase())
    });
    module.set_native_fn("len", |text: ImmutableString| -> ScriptResult<INT> {
        Ok(text.chars().count() as INT)
    });
    module
}

fn os_module(origin: Instant) -> Module {
    let mut module = Module::new();
    module.set_native_fn("clock", move || -> ScriptResult<FLOAT> {
        Ok(origin.elapsed().as_secs_f64() as FLOAT)
    });
    module.set_native_fn("time", || -> ScriptResult<INT> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| runtime_error(format!("time: {err}")))?;
        Ok(now.as_secs() as INT)
    });
    module.set_native_fn("difftime", |later: Dynamic, earlier: Dynamic| -> ScriptResult<FLOAT> {
        Ok(float_arg(&later, "difftime")? - float_arg(&earlier, "difftime")?)
    });
    module
}
