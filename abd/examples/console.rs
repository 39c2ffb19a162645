//! An interactive client for a cluster of 5 replicas running in this process
//!
//! Commands:
//! * `R <key>`
//! * `W <key> <value>`
//! * `EXEC <commands-file> <results-file>` runs every `R`/`W` line of the commands file and writes
//! one result line per command to the results file

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
};

use abd::{
    testing::{FaultyTransport, LocalCluster},
    transport::LocalTransport,
    SharedRegister,
};
use tracing_subscriber::EnvFilter;

type Client = SharedRegister<FaultyTransport<LocalTransport>>;

enum Command<'l> {
    Read(&'l str),
    Write(&'l str, &'l str),
    Exec(&'l str, &'l str),
}

fn parse(line: &str) -> Option<Command<'_>> {
    let fields: Vec<_> = line.split_whitespace().collect();
    match fields[..] {
        [op, key] if op.eq_ignore_ascii_case("R") => Some(Command::Read(key)),
        [op, key, value] if op.eq_ignore_ascii_case("W") => Some(Command::Write(key, value)),
        [op, commands, results] if op.eq_ignore_ascii_case("EXEC") => {
            Some(Command::Exec(commands, results))
        }
        _ => None,
    }
}

async fn run(client: &Client, command: &Command<'_>) -> String {
    match command {
        Command::Read(key) => match client.read(key).await {
            Ok(value) => format!("READ\tKey={}\tValue={}", key, value),
            Err(e) => e.to_string(),
        },
        Command::Write(key, value) => match client.write(key, *value).await {
            Ok(()) => format!("WRITE\tKey={}\tValue={}", key, value),
            Err(e) => e.to_string(),
        },
        Command::Exec(..) => "EXEC can not be nested".to_string(),
    }
}

async fn exec(client: &Client, commands: &str, results: &str) -> std::io::Result<usize> {
    let input = BufReader::new(File::open(commands)?);
    let mut output = BufWriter::new(File::create(results)?);

    let mut executed = 0;
    for (number, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse(&line) {
            Some(command) => run(client, &command).await,
            None => format!("Error when parsing line {}: {}", number, line),
        };
        writeln!(output, "{}", result)?;
        executed += 1;
    }
    output.flush()?;

    Ok(executed)
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let cluster = LocalCluster::new(5);
    let client = match cluster.client("console") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(());
        }
    };

    println!("Usage:");
    println!("R [key]");
    println!("W [key] [value]");
    println!("EXEC [filepath] [resultFilepath]");

    for line in std::io::stdin().lock().lines() {
        let line = line?;

        let result = match parse(&line) {
            Some(Command::Exec(commands, results)) => {
                match runtime.block_on(exec(&client, commands, results)) {
                    Ok(count) => format!("Executed {} operations", count),
                    Err(e) => format!("Batch failed: {}", e),
                }
            }
            Some(command) => runtime.block_on(run(&client, &command)),
            None => "Invalid Operation!".to_string(),
        };

        println!("{}", result);
    }

    Ok(())
}
