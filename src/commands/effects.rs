//! `effects`: list and inspect the effect library

use anyhow::anyhow;

use super::{CommandResult, Context};

pub fn list(ctx: &Context) -> CommandResult {
    let lib = ctx.effects()?;

    println!("Effects (from {}):", ctx.effects_path().display());
    println!();
    println!(
        "{:<16} {:<6} {:<6} {:<10} Description",
        "Name", "KFs", "Prio", "TTL"
    );
    println!("{}", "-".repeat(60));

    for (name, def) in &lib.effects {
        let ttl = match def.ttl() {
            Some(ttl) => format!("{}ms", ttl.as_millis()),
            None => "-".to_string(),
        };
        let vars = def.required_variables();
        let var_str = if vars.is_empty() {
            String::new()
        } else {
            format!(" [vars: {}]", vars.join(", "))
        };
        println!(
            "{:<16} {:<6} {:<6} {:<10} {}{}",
            name,
            def.keyframes.len(),
            def.priority,
            ttl,
            def.description.as_deref().unwrap_or(""),
            var_str
        );
    }

    Ok(())
}

pub fn show(ctx: &Context, name: &str) -> CommandResult {
    let lib = ctx.effects()?;
    let def = lib
        .get(name)
        .ok_or_else(|| anyhow!("unknown effect: {name} (available: {})", lib.names().join(", ")))?;

    println!("Effect: {name}");
    if let Some(desc) = &def.description {
        println!("Description: {desc}");
    }
    if let Some(color) = &def.color {
        println!("Color: {color}");
    }
    if let Some(mode) = &def.mode {
        println!("Mode: {mode} (speed {})", def.speed.unwrap_or(1.0));
    }
    println!("Priority: {}", def.priority);
    if let Some(ttl) = def.ttl() {
        println!("TTL: {}ms", ttl.as_millis());
    }

    let vars = def.required_variables();
    if !vars.is_empty() {
        println!("Required variables: {}", vars.join(", "));
    }

    if def.keyframes.is_empty() {
        println!("\nNo keyframes (solid effect)");
        return Ok(());
    }

    println!("\nKeyframes:");
    println!("  {:<8} {:<8} {:<14} Color", "Time", "Value", "Easing");
    println!("  {}", "-".repeat(44));
    for kf in &def.keyframes {
        println!(
            "  {:<8.0} {:<8.2} {:<14} {}",
            kf.t,
            kf.v,
            kf.easing,
            kf.color.as_deref().unwrap_or("-")
        );
    }
    println!("\nCycle: {:.0}ms", def.cycle_ms());
    Ok(())
}
