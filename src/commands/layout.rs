//! `layout`: print the configured LED layout

use keylight_core::Rect;

use super::{CommandResult, Context};

pub fn show(ctx: &Context, json: bool) -> CommandResult {
    let leds = ctx.layout()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&leds)?);
        return Ok(());
    }

    println!("{:<6} {:>8} {:>8} {:>8} {:>8}", "LED", "X", "Y", "Width", "Height");
    println!("{}", "-".repeat(42));
    for led in &leds {
        let r = led.rect;
        println!(
            "{:<6} {:>8.2} {:>8.2} {:>8.2} {:>8.2}",
            led.id, r.x, r.y, r.width, r.height
        );
    }

    let bounds = Rect::enclosing(leds.iter().map(|l| l.rect)).unwrap_or_default();
    println!();
    println!(
        "{} LEDs, bounds {:.2} x {:.2}",
        leds.len(),
        bounds.width,
        bounds.height
    );
    Ok(())
}
