fn main() {
    match handle_cli_flags() {
        Ok(true) => return,
        Ok(false) => {}
        Err(err) => {
            eprintln!("error: {err:?}");
            std::process::exit(1);
        }
    }

    if let Err(err) = shorts_tui::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> anyhow::Result<bool> {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Shorts-TUI {}", shorts_tui::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "Shorts-TUI: a vertical short-video feed with 7s video replies.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --print-config       Print the effective configuration and exit\n  --init-config        Write the default config file and exit"
                );
                saw_flag = true;
            }
            "--print-config" => {
                let cfg = shorts_tui::config::load(shorts_tui::config::LoadOptions::default())?;
                print!("{}", shorts_tui::config::to_yaml(&cfg)?);
                saw_flag = true;
            }
            "--init-config" => {
                let (path, created) = shorts_tui::config::write_default(None)?;
                if created {
                    println!("Wrote default config to {}", path.display());
                } else {
                    println!("Config already exists at {}", path.display());
                }
                saw_flag = true;
            }
            _ => {}
        }
    }
    Ok(saw_flag)
}
