use std::fs;

use bh_core::ObjectHandle;
use bh_host::{World, WorldDescription};
use bh_runtime::RegistryOptions;
use serde::Serialize;

use crate::cli_args::{InspectArgs, RegistryArgs, SendArgs};
use crate::error_map::{
    cli_object_not_found, json_string, map_cli_world_invalid, map_cli_world_read, CliError,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainReport {
    object: String,
    state: &'static str,
    chain: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsesReport {
    behavior: String,
    uses: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecReport {
    round: usize,
    object: String,
    context: String,
    passed: bool,
}

#[derive(Debug, Serialize)]
struct VarReport<'a> {
    name: &'a str,
    value: Option<bh_core::Value>,
}

impl RegistryArgs {
    fn options(&self) -> RegistryOptions {
        RegistryOptions {
            min_capacity: self.min_capacity,
            max_inherit_depth: self.max_inherit_depth,
            ..RegistryOptions::default()
        }
    }
}

pub(crate) fn load_world(path: &str, registry: &RegistryArgs) -> Result<World, CliError> {
    let text = fs::read_to_string(path).map_err(map_cli_world_read)?;
    let description: WorldDescription =
        serde_json::from_str(&text).map_err(map_cli_world_invalid)?;
    let world = World::load(&description, registry.options())?;
    tracing::debug!(path, records = world.behaviors().occupancy(), "world loaded");
    Ok(world)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string(value).map_err(|error| CliError::new("CLI_OUTPUT", error.to_string()))
}

fn chain_state(world: &World, object: ObjectHandle) -> Option<&'static str> {
    let use_id = world.object(object)?.behavior()?;
    let record = world.behaviors().get_parent(use_id)?;
    Some(if world.behaviors().is_blocked(record) {
        "blocked"
    } else if world.behaviors().get_object(record).is_none() {
        "unresolved"
    } else {
        "resolved"
    })
}

pub(crate) fn run_inspect(args: InspectArgs) -> Result<i32, CliError> {
    let world = load_world(&args.world, &args.registry)?;
    let behaviors = world.behaviors();

    let mut lines = Vec::new();
    let handles: Vec<ObjectHandle> = world.store().handles().collect();
    for &handle in &handles {
        if let Some(state) = chain_state(&world, handle) {
            let report = ChainReport {
                object: world.long_id(handle),
                state,
                chain: world
                    .behavior_chain(handle)
                    .into_iter()
                    .map(|link| world.long_id(link))
                    .collect(),
            };
            lines.push(format!("CHAIN_JSON:{}", to_json(&report)?));
        }
    }
    for &handle in &handles {
        if world.object(handle).is_some_and(|object| object.is_behavior()) {
            let report = UsesReport {
                behavior: world.long_id(handle),
                uses: world.behavior_uses(handle)?,
            };
            lines.push(format!("USES_JSON:{}", to_json(&report)?));
        }
    }

    println!("RESULT:OK");
    println!(
        "STATS:records={}|uses={}|capacity={}",
        behaviors.occupancy(),
        behaviors.use_count(),
        behaviors.capacity()
    );
    for line in lines {
        println!("{}", line);
    }
    Ok(0)
}

pub(crate) fn run_send(args: SendArgs) -> Result<i32, CliError> {
    let mut world = load_world(&args.world, &args.registry)?;
    let target = world
        .find_object(&args.stack, args.id)
        .ok_or_else(|| cli_object_not_found(&args.stack, args.id))?;

    let mut lines = Vec::new();
    let mut handled = false;
    for round in 1..=args.repeat {
        let trace = world.send(target, &args.message)?;
        handled = trace.handled;
        for executed in trace.executed {
            let report = ExecReport {
                round,
                object: world.long_id(executed.object),
                context: world.long_id(executed.context),
                passed: executed.passed,
            };
            lines.push(format!("EXEC_JSON:{}", to_json(&report)?));
        }
    }

    for name in &args.vars {
        let value = world
            .behavior_variable(target, name)?
            .map(|variable| variable.borrow().value.clone());
        let report = VarReport { name, value };
        lines.push(format!("VAR_JSON:{}", to_json(&report)?));
    }

    println!("RESULT:OK");
    println!("TARGET_JSON:{}", json_string(&world.long_id(target)));
    println!("HANDLED:{}", handled);
    for line in lines {
        println!("{}", line);
    }
    Ok(0)
}
