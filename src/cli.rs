use clap::Parser;
use std::io::{self, Write};

use derrick::client::{send_payload, ApiClient};
use derrick::decoder;
use derrick::parser::{self, Command};
use derrick::model::FORECAST_TAG;
use derrick::Record;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Operator console for the derrick well listener", long_about = None)]
struct Args {
    /// Listener that receives well payloads
    #[clap(long, env = "DERRICK_INGEST_ADDR", default_value = "127.0.0.1:9090")]
    ingest_addr: String,

    /// HTTP read/admin API
    #[clap(long, env = "DERRICK_API_ADDR", default_value = "127.0.0.1:8080")]
    api_addr: String,
}

struct Console {
    ingest_addr: String,
    api: ApiClient,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    print_banner();

    let console = Console {
        ingest_addr: args.ingest_addr.clone(),
        api: ApiClient::new(&args.api_addr),
    };

    match console.api.status().await {
        Ok(_) => println!("[\u{2713}] Connected to derrick at {}!", console.api.base_url()),
        Err(_) => {
            println!("[\u{2717}] Could not reach the API at {}.", console.api.base_url());
            println!("    Make sure the 'derrick' daemon is running.");
            return;
        }
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("derrick> ");
        let _ = io::stdout().flush();
        buffer.clear();

        match stdin.read_line(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = console.execute(cmd).await {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.to_uppercase().starts_with("SEND FILE") {
                    println!("    \u{2139}\u{fe0f}  Hint: Quote the path: SEND FILE \"readings.json\"");
                }
            }
        }
    }
}

fn print_banner() {
    println!("\n==================================================");
    println!("   Derrick Console - Oil Well Telemetry");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. SEND:      SEND {{\"well_data\": [{{\"client\": \"W1\", \"Oil volume\": 50}}]}}");
    println!("2. SEND FILE: SEND FILE \"readings.json\"");
    println!("3. HISTORY:   HISTORY [LIMIT 10]");
    println!("4. LATEST:    LATEST ['W1']");
    println!("5. STATUS:    STATUS");
    println!("6. RESET:     RESET");
    println!("7. START:     START   (show live data on dashboards)");
    println!("8. STOP:      STOP    (hide live data; ingestion continues)");
    println!("9. EXIT:      Quit\n");
}

impl Console {
    async fn execute(&self, cmd: Command) -> Result<(), String> {
        match cmd {
            Command::Help => { print_help(); Ok(()) },
            Command::Send { payload } => self.send(payload.into_bytes()).await,
            Command::SendFile { path } => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| format!("{}: {}", path, e))?;
                self.send(bytes).await
            },
            Command::History { limit } => {
                let records = self.api.history(limit).await.map_err(|e| e.to_string())?;
                println!("\n{} record(s), newest first:", records.len());
                for (i, record) in records.iter().enumerate() {
                    print_record(i, record);
                }
                println!();
                Ok(())
            },
            Command::Latest { client } => {
                match self.api.latest(client.as_deref()).await.map_err(|e| e.to_string())? {
                    Some(record) => print_record(0, &record),
                    None => println!("[\u{2717}] No matching record."),
                }
                Ok(())
            },
            Command::Status => {
                let s = self.api.status().await.map_err(|e| e.to_string())?;
                println!("Records:   {} / {}", s.records, s.capacity);
                println!("Epoch:     {}", s.epoch);
                println!("Display:   {}", if s.active { "ACTIVE" } else { "STOPPED" });
                println!("Latest:    {}", s.latest_timestamp.as_deref().unwrap_or("-"));
                if s.stale {
                    println!("[\u{26a0}\u{fe0f}] No fresh readings. Check that producers are running.");
                }
                Ok(())
            },
            Command::Reset => {
                let r = self.api.reset().await.map_err(|e| e.to_string())?;
                println!("[\u{2713} OK] History cleared (epoch {}).", r.epoch);
                Ok(())
            },
            Command::Start | Command::Stop => {
                let state = self
                    .api
                    .set_active(cmd == Command::Start)
                    .await
                    .map_err(|e| e.to_string())?;
                println!("[\u{2713} OK] Display {}.", if state.active { "started" } else { "stopped" });
                Ok(())
            },
            Command::Exit => Ok(()),
        }
    }

    async fn send(&self, payload: Vec<u8>) -> Result<(), String> {
        // Fail fast here; the listener would only log and drop it.
        let records = decoder::decode(&payload).map_err(|e| e.to_string())?;
        send_payload(&self.ingest_addr, &payload).await.map_err(|e| e.to_string())?;
        println!("[\u{2713} OK] Sent {} record(s) to {}", records.len(), self.ingest_addr);
        Ok(())
    }
}

fn print_record(index: usize, record: &Record) {
    let mut metrics: Vec<String> = record
        .metrics
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    metrics.sort();

    println!(
        "  #{:<4} {} | {} | {}",
        index,
        record.timestamp_str().unwrap_or("-"),
        record.client_or_unknown(),
        metrics.join(", ")
    );
    for alert in record.forecast_alerts() {
        println!("         \u{1f52e} {}", alert);
    }
    for alert in record.alerts().filter(|a| !a.contains(FORECAST_TAG)) {
        println!("         \u{26a0}\u{fe0f} {}", alert);
    }
}
