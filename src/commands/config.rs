//! `config`: print the effective configuration

use super::{CommandResult, Context};

pub fn show(ctx: &Context, write: bool) -> CommandResult {
    if write {
        ctx.config.save(&ctx.config_path)?;
        println!("Wrote {}", ctx.config_path.display());
        return Ok(());
    }

    let exists = ctx.config_path.exists();
    println!(
        "# {}{}",
        ctx.config_path.display(),
        if exists { "" } else { " (not found, showing defaults)" }
    );
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}
