mod render;

use anyhow::Context;
use clap::Parser;
use parley_client::{ChatClient, ContentPanel, ContentRouter, Session, SessionStatus};
use parley_contract::Message;
use render::{render_message, render_panel, status_line, StreamPrinter};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "parley-chat")]
struct Args {
    #[arg(long, env = "PARLEY_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server_url: String,

    /// Send one message, print the reply and exit.
    #[arg(long, short)]
    message: Option<String>,

    /// Print tool invocations inline.
    #[arg(long, default_value_t = false)]
    show_tools: bool,
}

struct Chat {
    client: ChatClient,
    session: Session,
    router: ContentRouter,
    panel: ContentPanel,
    show_tools: bool,
}

impl Chat {
    fn new(args: &Args) -> Self {
        let panel = ContentPanel::new();
        panel.subscribe(|state| {
            if let Some(rendered) = render_panel(state) {
                println!("\n{rendered}");
            }
        });
        Self {
            client: ChatClient::new(&args.server_url),
            session: Session::new(),
            router: ContentRouter::default(),
            panel,
            show_tools: args.show_tools,
        }
    }

    async fn turn(&mut self, text: &str) -> anyhow::Result<SessionStatus> {
        let mut printer = StreamPrinter::default();
        let router = &self.router;
        let panel = &self.panel;
        let show_tools = self.show_tools;
        let status = self
            .client
            .run_turn(&mut self.session, Message::user(text), |session| {
                let Some(reply) = session.last_assistant() else {
                    return;
                };
                // The panel opens as soon as a routed item is complete.
                let inline = router.route_into(reply, panel);
                if let Some(tail) = printer.advance(&render_message(&inline, show_tools)) {
                    print!("{tail}");
                    let _ = std::io::stdout().flush();
                }
            })
            .await
            .context("chat request failed")?;

        if let Some(reply) = self.session.last_assistant() {
            let inline = self.router.route_into(reply, &self.panel);
            print!("{}", printer.finish(&render_message(&inline, self.show_tools)));
        }
        println!();
        if let Some(line) = status_line(status, self.session.last_error()) {
            eprintln!("{line}");
        }
        Ok(status)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut chat = Chat::new(&args);
    tracing::debug!(endpoint = chat.client.endpoint(), "parley-chat started");

    if let Some(message) = &args.message {
        let status = chat.turn(message).await?;
        if status == SessionStatus::Error {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/close" {
            chat.panel.close();
            continue;
        }
        if let Err(e) = chat.turn(line).await {
            eprintln!("{e:#}");
        }
    }
    Ok(())
}
