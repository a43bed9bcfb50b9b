//! broadcast transfer simulation for Skylink

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use skylink_sim::{scenarios, LinkPresets};
use skylink_transfer::TransferConfig;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "Skylink Transfer Simulation".bright_blue().bold());
    println!("{}", "===========================".bright_blue());
    println!();

    let presets = vec![
        ("Good Conditions", LinkPresets::good_conditions()),
        ("Average Conditions", LinkPresets::average_conditions()),
        ("Poor Conditions", LinkPresets::poor_conditions()),
    ];

    let transfer_cfg = TransferConfig {
        send_interval: Duration::from_millis(5),
        poll_sleep: Duration::from_millis(1),
        metadata_interval: 16,
        ..TransferConfig::default()
    };
    let file = scenarios::sample_file(400);

    for (name, air_cfg) in presets {
        println!("{}", format!("\n>>> Testing: {}", name).bright_green().bold());
        println!("Frame loss: {}%", (air_cfg.packet_loss * 100.0) as u32);
        println!("Bit errors: {}%", (air_cfg.corrupt_prob * 100.0) as u32);
        println!();

        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                .expect("static template"),
        );
        let progress_bar = bar.clone();

        let report = scenarios::broadcast_transfer(
            air_cfg,
            transfer_cfg.clone(),
            "field-notes.txt",
            &file,
            Duration::from_secs(120),
            move |fraction| {
                progress_bar.set_position((fraction * 100.0) as u64);
            },
        )
        .await?;
        bar.finish_and_clear();

        println!("  - file: {} ({} bytes)", report.filename, report.file_bytes);
        println!("  - elapsed: {:?}", report.elapsed);
        println!(
            "  - frames: {} sent, {} lost, {} corrupted",
            report.frames_sent, report.frames_dropped, report.frames_corrupted
        );
        let throughput = (report.file_bytes * 8) as f64 / report.elapsed.as_secs_f64();
        println!("  - effective throughput: {:.0} bps", throughput);
        println!("{}", "Transfer complete!".bright_yellow());
        println!("{}", "-".repeat(50));
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
