use approx::assert_relative_eq;
use snakebots_core::{
    Decision, DecisionBackend, DecisionError, HoldCourse, Perception, Point, RuntimeState,
    ScriptSettings, SnakeBotsConfig, WorldState,
};
use snakebots_script::{DEMO_SCRIPT, ScriptRuntime};
use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant};

fn quiet_config() -> SnakeBotsConfig {
    SnakeBotsConfig {
        food_value_mean: 0.0,
        food_value_stddev: 0.0,
        rng_seed: Some(1),
        ..SnakeBotsConfig::default()
    }
}

/// World with one food item straight "up" from a scout agent, plus that agent's perception.
fn scout() -> (WorldState, Perception) {
    let mut world = WorldState::new(quiet_config()).expect("world");
    world
        .place_food(Point::new(64.0, 70.0), 5.0)
        .expect("food");
    let id = world
        .add_agent_at("scout", Box::new(HoldCourse::new()), Point::new(64.0, 64.0), 0.0)
        .expect("agent");
    let perception = world.perception_for(id).expect("perception");
    (world, perception)
}

fn settings() -> ScriptSettings {
    ScriptSettings {
        max_operations: 10_000,
        time_budget_ms: 1_000,
        ..ScriptSettings::default()
    }
}

fn runtime(source: &str) -> ScriptRuntime {
    ScriptRuntime::new("test", source, settings()).with_rng_seed(7)
}

#[test]
fn first_step_initializes_lazily() {
    let (_world, perception) = scout();
    let mut rt = runtime("fn step() { 0.5 }");
    assert_eq!(rt.state(), RuntimeState::Uninitialized);
    let decision = rt.step(&perception).expect("decision");
    assert_eq!(decision, Decision::turn(0.5));
    assert_eq!(rt.state(), RuntimeState::Ready);
}

#[test]
fn map_results_carry_boost() {
    let (_world, perception) = scout();
    let mut rt = runtime("fn step() { #{ heading: -1, boost: true } }");
    let decision = rt.step(&perception).expect("decision");
    assert_relative_eq!(decision.heading_delta, -1.0);
    assert!(decision.boost);
}

#[test]
fn self_map_persists_and_is_republished() {
    let (_world, perception) = scout();
    let mut rt = runtime(
        r#"
        fn step() {
            this.calls = (this.calls ?? 0) + 1;
            this.id = "overwritten";
            this.calls
        }
        "#,
    );
    for expected in 1..=3 {
        let decision = rt.step(&perception).expect("decision");
        assert_relative_eq!(decision.heading_delta, expected as f32);
    }
    let this = rt.self_map().expect("loaded");
    assert_eq!(
        this.get("calls").and_then(|v| v.as_int().ok()),
        Some(3)
    );

    let mut rt = runtime(r#"fn step() { if this.r == 1.0 { 1 } else { 0 } }"#);
    assert_eq!(rt.step(&perception).expect("decision"), Decision::turn(1.0));
    let id = rt
        .self_map()
        .and_then(|this| this.get("id"))
        .and_then(|v| v.clone().into_string().ok())
        .expect("id");
    assert_eq!(id, perception.guid().to_string());
}

#[test]
fn infinite_loop_exhausts_the_instruction_quota() {
    let (_world, perception) = scout();
    let mut rt = runtime("fn step() { let x = 0; loop { x += 1; } }");
    assert!(matches!(
        rt.step(&perception),
        Err(DecisionError::QuotaExceeded(_))
    ));
    assert_eq!(rt.state(), RuntimeState::Faulted);
    assert_eq!(rt.step(&perception), Err(DecisionError::Faulted));

    rt.reset();
    assert_eq!(rt.state(), RuntimeState::Uninitialized);
    assert!(matches!(
        rt.step(&perception),
        Err(DecisionError::QuotaExceeded(_))
    ));
}

#[test]
fn wall_clock_budget_stops_long_scripts() {
    let (_world, perception) = scout();
    let settings = ScriptSettings {
        max_operations: 1 << 40,
        time_budget_ms: 20,
        ..ScriptSettings::default()
    };
    let mut rt = ScriptRuntime::new("slow", "fn step() { let x = 0; loop { x += 1; } }", settings);
    let started = Instant::now();
    assert!(matches!(
        rt.step(&perception),
        Err(DecisionError::QuotaExceeded(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn runaway_recursion_is_a_quota_failure() {
    let (_world, perception) = scout();
    let mut rt = runtime("fn down(n) { down(n + 1) } fn step() { down(0) }");
    assert!(matches!(
        rt.step(&perception),
        Err(DecisionError::QuotaExceeded(_))
    ));
}

#[test]
fn unknown_functions_are_not_reachable() {
    let (_world, perception) = scout();
    for source in [
        r#"fn step() { open_file("/etc/passwd") }"#,
        r#"fn step() { timestamp() }"#,
    ] {
        let mut rt = runtime(source);
        assert!(
            matches!(rt.step(&perception), Err(DecisionError::ScriptRuntime(_))),
            "{source} should fail at runtime"
        );
        assert_eq!(rt.state(), RuntimeState::Faulted);
    }
}

#[test]
fn eval_and_imports_are_rejected() {
    let (_world, perception) = scout();
    let mut rt = runtime(r#"fn step() { eval("1 + 1") }"#);
    assert!(matches!(
        rt.step(&perception),
        Err(DecisionError::ScriptLoad(_) | DecisionError::ScriptRuntime(_))
    ));
    assert_eq!(rt.state(), RuntimeState::Faulted);

    let mut rt = runtime(r#"import "os" as host; fn step() { 0 }"#);
    assert!(matches!(
        rt.step(&perception),
        Err(DecisionError::ScriptLoad(_))
    ));
}

#[test]
fn load_failures_fault_the_runtime() {
    let (_world, perception) = scout();
    let cases = [
        "fn think() { 0 }",
        "fn step( { 0 }",
        r#"throw "refusing to start"; fn step() { 0 }"#,
        "let n = findFood(10, 0); fn step() { 0 }",
    ];
    for source in cases {
        let mut rt = runtime(source);
        assert!(
            matches!(rt.initialize(), Err(DecisionError::ScriptLoad(_))),
            "{source} should fail to load"
        );
        assert_eq!(rt.state(), RuntimeState::Faulted);
        assert_eq!(rt.step(&perception), Err(DecisionError::Faulted));
    }

    let mut rt = runtime("let x = 0; loop { x += 1; } fn step() { 0 }");
    assert!(matches!(
        rt.initialize(),
        Err(DecisionError::QuotaExceeded(_))
    ));
}

#[test]
fn unusable_results_are_runtime_errors() {
    let (_world, perception) = scout();
    for source in [
        r#"fn step() { "left" }"#,
        "fn step() { #{ boost: true } }",
        r#"fn step() { #{ heading: 1.0, boost: "yes" } }"#,
        "fn step() { 1.0 / 0.0 }",
    ] {
        let mut rt = runtime(source);
        assert!(
            matches!(rt.step(&perception), Err(DecisionError::ScriptRuntime(_))),
            "{source} should be rejected"
        );
    }
}

#[test]
fn sensing_reports_relative_geometry() {
    let (_world, perception) = scout();
    let mut rt = runtime(
        r#"
        fn step() {
            if findFood(50, 0).len() < 2 { throw "seeded food should be in range"; }
            let food = findFood(50, 1);
            if food.len() != 1 { throw "expected exactly one food"; }
            let f = food[0];
            if math::abs(f.x) > 0.001 || math::abs(f.y - 6.0) > 0.001 { throw "bad offset"; }
            if math::abs(f.dist - 6.0) > 0.001 || math::abs(f.v - 5.0) > 0.001 { throw "bad distance"; }
            f.d
        }
        "#,
    );
    let decision = rt.step(&perception).expect("decision");
    assert_relative_eq!(decision.heading_delta, FRAC_PI_2, epsilon = 1e-5);
}

#[test]
fn segment_sensing_honours_include_self() {
    let (_world, perception) = scout();
    let mut rt = runtime(
        r#"
        fn step() {
            let mine = findSegments(10, true);
            let others = findSegments(10, false);
            if mine[0].bot != this.id { throw "segment owner should be us"; }
            #{ heading: mine.len() * 10 + others.len(), boost: false }
        }
        "#,
    );
    let decision = rt.step(&perception).expect("decision");
    assert_relative_eq!(decision.heading_delta, 50.0);
}

#[test]
fn sensing_results_are_truncated_to_the_array_limit() {
    let mut world = WorldState::new(quiet_config()).expect("world");
    for dx in 1..=5 {
        world
            .place_food(Point::new(30.0 + dx as f32, 30.0), 3.0)
            .expect("food");
    }
    let id = world
        .add_agent_at("scout", Box::new(HoldCourse::new()), Point::new(30.0, 30.0), 0.0)
        .expect("agent");
    let perception = world.perception_for(id).expect("perception");
    let settings = ScriptSettings {
        max_array_size: 2,
        ..settings()
    };
    let mut rt = ScriptRuntime::new("cap", "fn step() { findFood(10, 1).len() }", settings.clone());
    assert_eq!(rt.step(&perception).expect("decision"), Decision::turn(2.0));

    // Tiny array limits leave room for the sighting maps themselves.
    let mut rt = ScriptRuntime::new(
        "cap",
        "fn step() { findFood(10, 1).len() + findSegments(10, true).len() }",
        ScriptSettings {
            max_array_size: 1,
            ..settings
        },
    );
    assert_eq!(rt.step(&perception).expect("decision"), Decision::turn(2.0));
}

#[test]
fn map_limit_is_enforced_separately() {
    let (_world, perception) = scout();
    let settings = ScriptSettings {
        max_map_size: 8,
        ..settings()
    };
    let mut rt = ScriptRuntime::new(
        "maps",
        "fn step() { let m = #{a: 1, b: 2, c: 3, d: 4, e: 5, f: 6, g: 7, h: 8, i: 9}; 0 }",
        settings,
    );
    assert!(matches!(
        rt.step(&perception),
        Err(DecisionError::QuotaExceeded(_))
    ));
}

#[test]
fn library_modules_are_available() {
    let (_world, perception) = scout();
    let mut rt = runtime(
        r#"
        fn step() {
            let s = string::format("n={}", 3);
            if string::len(s) != 3 { throw "format"; }
            if string::upper("ab") != "AB" || string::lower("AB") != "ab" { throw "case"; }
            if string::sub("hello", 1, 3) != "ell" { throw "sub"; }
            let r = math::random(1, 6);
            if r < 1 || r > 6 { throw "random"; }
            if os::difftime(os::clock(), 0.0) < 0.0 { throw "clock"; }
            if os::time() < 1_600_000_000 { throw "time"; }
            let parts = math::modf(-2.25);
            if parts[0] != -2.0 || parts[1] != -0.25 { throw "modf"; }
            let split = math::frexp(12.0);
            if split[0] != 0.75 || split[1] != 4 { throw "frexp"; }
            if math::ldexp(0.75, 4) != 12.0 { throw "ldexp"; }
            math::sqrt(16) + math::max(1, 2)
        }
        "#,
    );
    assert_eq!(rt.step(&perception).expect("decision"), Decision::turn(6.0));
}

#[test]
fn prelude_helpers_pick_targets() {
    let mut world = WorldState::new(quiet_config()).expect("world");
    world.place_food(Point::new(40.0, 45.0), 2.0).expect("near");
    world.place_food(Point::new(40.0, 32.0), 9.0).expect("rich");
    let id = world
        .add_agent_at("scout", Box::new(HoldCourse::new()), Point::new(40.0, 40.0), 0.0)
        .expect("agent");
    let perception = world.perception_for(id).expect("perception");
    let mut rt = runtime(
        r#"
        fn step() {
            let food = findFood(20, 1);
            let near = nearest(food);
            let rich = richest(food);
            #{ heading: angle_to(near) + angle_to(rich), boost: rich.v > 5.0 }
        }
        "#,
    );
    let decision = rt.step(&perception).expect("decision");
    // Up (+pi/2) plus down (-pi/2).
    assert_relative_eq!(decision.heading_delta, 0.0, epsilon = 1e-5);
    assert!(decision.boost);
}

#[test]
fn scripted_agent_turns_towards_food_in_the_world() {
    let mut world = WorldState::new(quiet_config()).expect("world");
    world
        .place_food(Point::new(64.0, 70.0), 5.0)
        .expect("food");
    let id = world
        .add_agent_at(
            "seer",
            Box::new(runtime("fn step() { angle_to(nearest(findFood(10, 1))) }")),
            Point::new(64.0, 64.0),
            0.0,
        )
        .expect("agent");
    let summary = world.step().expect("step");
    assert_eq!(summary.decisions, 1);
    let agent = world.agent(id).expect("agent");
    assert!(agent.last_error().is_none());
    let decision = agent.last_decision().expect("decision");
    assert_relative_eq!(decision.heading_delta, FRAC_PI_2, epsilon = 1e-5);
    assert_relative_eq!(agent.heading(), FRAC_PI_2, epsilon = 1e-5);
}

#[test]
fn faulted_agent_holds_heading_while_others_move() {
    let mut config = quiet_config();
    config.script.max_operations = 5_000;
    let mut world = WorldState::new(config.clone()).expect("world");
    let looping = world
        .add_agent_at(
            "looping",
            Box::new(ScriptRuntime::new(
                "looping",
                "fn step() { let x = 0; loop { x += 1; } }",
                config.script.clone(),
            )),
            Point::new(20.0, 20.0),
            1.0,
        )
        .expect("looping");
    let turning = world
        .add_agent_at(
            "turning",
            Box::new(ScriptRuntime::new("turning", "fn step() { 0.25 }", config.script.clone())),
            Point::new(90.0, 90.0),
            0.0,
        )
        .expect("turning");

    for _ in 0..3 {
        let summary = world.step().expect("step");
        assert_eq!(summary.faulted, 1);
        assert_eq!(summary.decisions, 1);
    }
    let agent = world.agent(looping).expect("agent");
    assert_eq!(agent.decision_state(), RuntimeState::Faulted);
    assert_relative_eq!(agent.heading(), 1.0, epsilon = 1e-6);
    assert!(matches!(
        agent.last_error(),
        Some(DecisionError::QuotaExceeded(_))
    ));
    assert_relative_eq!(world.agent(turning).expect("agent").heading(), 0.75, epsilon = 1e-5);

    world.reset_agent_decisions(looping).expect("reset");
    assert_eq!(
        world.agent(looping).expect("agent").decision_state(),
        RuntimeState::Uninitialized
    );
}

#[test]
fn demo_bots_run_in_parallel_without_faulting() {
    let config = SnakeBotsConfig {
        rng_seed: Some(99),
        parallel_decisions: true,
        ..SnakeBotsConfig::default()
    };
    let mut world = WorldState::new(config.clone()).expect("world");
    for idx in 0..6_u64 {
        let runtime = ScriptRuntime::new(format!("demo{idx}"), DEMO_SCRIPT, config.script.clone())
            .with_rng_seed(idx);
        world
            .add_agent(format!("demo{idx}"), Box::new(runtime))
            .expect("agent");
    }
    for _ in 0..30 {
        let summary = world.step().expect("step");
        assert_eq!(summary.faulted, 0);
        assert_eq!(summary.decisions, 6);
    }
    assert!(
        world
            .agents()
            .all(|(_, agent)| agent.decision_state() == RuntimeState::Ready)
    );
}
