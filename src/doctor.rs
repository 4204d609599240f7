use canvasflow_core::config::AppConfig;
use canvasflow_core::route::{NodeId, RouteTarget};
use canvasflow_graph::EdgeTable;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

/// Run every health check and print the results. Returns the number of issues.
pub fn run_doctor(config: &AppConfig) -> usize {
    let checks = vec![
        // 1. Generation settings in range
        check_generation(config),
        // 2. Every node reachable from the router
        check_reachable(),
        // 3. Every planned path ends at the reset node
        check_plans(),
        // 4. Step limit fits the longest path
        check_step_limit(config),
        // 5. Run log directory writable
        check_log_dir(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
    fail_count
}

fn check_generation(config: &AppConfig) -> CheckResult {
    let settings = &config.generation;
    let mut problems = Vec::new();
    if !(0.0..=2.0).contains(&settings.temperature) {
        problems.push(format!("temperature {} outside 0.0..=2.0", settings.temperature));
    }
    if settings.max_tokens == 0 {
        problems.push("max_tokens is 0".to_string());
    }

    if problems.is_empty() {
        CheckResult {
            label: "Generation".into(),
            ok: true,
            detail: format!(
                "temperature {}, max_tokens {}",
                settings.temperature, settings.max_tokens
            ),
        }
    } else {
        CheckResult {
            label: "Generation".into(),
            ok: false,
            detail: problems.join("; "),
        }
    }
}

fn check_reachable() -> CheckResult {
    let reachable = EdgeTable::reachable();
    let unreachable: Vec<&str> = NodeId::ALL
        .iter()
        .filter(|id| !reachable.contains(id))
        .map(|id| id.as_str())
        .collect();

    if unreachable.is_empty() {
        CheckResult {
            label: "Topology".into(),
            ok: true,
            detail: format!("{} nodes reachable from {}", reachable.len(), EdgeTable::ENTRY),
        }
    } else {
        CheckResult {
            label: "Topology".into(),
            ok: false,
            detail: format!("Unreachable: {}", unreachable.join(", ")),
        }
    }
}

fn check_plans() -> CheckResult {
    let bad: Vec<&str> = RouteTarget::ALL
        .iter()
        .filter(|t| EdgeTable::plan(**t).last() != Some(&EdgeTable::RESET))
        .map(|t| t.as_str())
        .collect();

    if bad.is_empty() {
        CheckResult {
            label: "Paths".into(),
            ok: true,
            detail: format!(
                "{} route targets, all end at {}",
                RouteTarget::ALL.len(),
                EdgeTable::RESET
            ),
        }
    } else {
        CheckResult {
            label: "Paths".into(),
            ok: false,
            detail: format!("Not ending at {}: {}", EdgeTable::RESET, bad.join(", ")),
        }
    }
}

fn check_step_limit(config: &AppConfig) -> CheckResult {
    let longest = RouteTarget::ALL
        .iter()
        .map(|t| EdgeTable::plan(*t).len())
        .max()
        .unwrap_or(0);
    let max_steps = config.graph.max_steps;

    CheckResult {
        label: "Step limit".into(),
        ok: max_steps >= longest,
        detail: format!("max_steps = {} (longest path: {} nodes)", max_steps, longest),
    }
}

fn check_log_dir(config: &AppConfig) -> CheckResult {
    let Some(dir) = config.log_dir() else {
        return CheckResult {
            label: "Run log".into(),
            ok: true,
            detail: "Disabled".into(),
        };
    };

    if let Err(e) = std::fs::create_dir_all(&dir) {
        return CheckResult {
            label: "Run log".into(),
            ok: false,
            detail: format!("{} (cannot create: {})", dir.display(), e),
        };
    }

    // Check writable by attempting to create a temp file
    let test_file = dir.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Run log".into(),
                ok: true,
                detail: format!("{} (level {})", dir.display(), config.log_level()),
            }
        }
        Err(e) => CheckResult {
            label: "Run log".into(),
            ok: false,
            detail: format!("{} (not writable: {})", dir.display(), e),
        },
    }
}
