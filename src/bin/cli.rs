use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;

const TOKEN_FILE: &str = ".sponsor_token";

#[derive(Parser)]
#[command(name = "sponsor-cli")]
#[command(about = "CLI for the Sponsor Tracker API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token; falls back to the one saved by `login`.
    #[arg(short, long, env = "SPONSOR_TOKEN", global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short = 'n', long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Me,
    List {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        #[arg(short, long)]
        status: Option<String>,
    },
    Create {
        #[arg(short, long)]
        brand: String,
        #[arg(short, long)]
        amount: f64,
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        contact_email: Option<String>,
        /// Repeatable.
        #[arg(short, long = "deliverable")]
        deliverables: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Get {
        #[arg(short, long)]
        id: String,
    },
    SetStatus {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        status: String,
        /// Kept on the status history entry.
        #[arg(short, long)]
        reason: Option<String>,
    },
    Delete {
        #[arg(short, long)]
        id: String,
    },
    History {
        #[arg(short, long)]
        id: String,
    },
    Stats,
    Checkout {
        #[arg(short = 'n', long)]
        product: String,
        #[arg(short, long)]
        price: String,
    },
    Logout,
}

#[derive(Deserialize)]
struct AuthEnvelope {
    data: AuthData,
}

#[derive(Deserialize)]
struct AuthData {
    token: String,
}

fn authorized(builder: RequestBuilder, token: &Option<String>) -> RequestBuilder {
    let token = token
        .clone()
        .unwrap_or_else(|| fs::read_to_string(TOKEN_FILE).unwrap_or_default());
    builder.bearer_auth(token.trim())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(text);
    println!("{status}\n{pretty}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api", cli.url.trim_end_matches('/'));
    let token = cli.token;

    match cli.command {
        Commands::Register { username, email, password } => {
            let res = client
                .post(format!("{api}/auth/register"))
                .json(&json!({ "username": username, "email": email, "password": password }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{api}/auth/login"))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: AuthEnvelope = res.json().await?;
                fs::write(TOKEN_FILE, body.data.token)?;
                println!("Logged in. Token saved to {TOKEN_FILE}");
            } else {
                print_response(res).await?;
            }
        }
        Commands::Me => {
            let res = authorized(client.get(format!("{api}/auth/me")), &token)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::List { page, status } => {
            let mut query = vec![("page", page.to_string())];
            if let Some(status) = status {
                query.push(("status", status));
            }
            let res = authorized(client.get(format!("{api}/sponsorships")), &token)
                .query(&query)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Create {
            brand,
            amount,
            product,
            priority,
            contact_email,
            deliverables,
            notes,
        } => {
            let mut body = Map::new();
            body.insert("brandName".into(), json!(brand));
            body.insert("dealAmount".into(), json!(amount));
            for (key, value) in [
                ("productService", product),
                ("priority", priority),
                ("contactEmail", contact_email),
                ("notes", notes),
            ] {
                if let Some(value) = value {
                    body.insert(key.into(), json!(value));
                }
            }
            if !deliverables.is_empty() {
                body.insert("deliverables".into(), json!(deliverables));
            }

            let res = authorized(client.post(format!("{api}/sponsorships")), &token)
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Get { id } => {
            let res = authorized(client.get(format!("{api}/sponsorships/{id}")), &token)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::SetStatus { id, status, reason } => {
            let res = authorized(client.put(format!("{api}/sponsorships/{id}")), &token)
                .json(&json!({ "status": status, "statusReason": reason.unwrap_or_default() }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Delete { id } => {
            let res = authorized(client.delete(format!("{api}/sponsorships/{id}")), &token)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::History { id } => {
            let res = authorized(
                client.get(format!("{api}/sponsorships/{id}/history")),
                &token,
            )
            .send()
            .await?;
            print_response(res).await?;
        }
        Commands::Stats => {
            let res = authorized(client.get(format!("{api}/dashboard/stats")), &token)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Checkout { product, price } => {
            let res = authorized(client.post(format!("{api}/checkout")), &token)
                .json(&json!({ "productName": product, "price": price }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
    }

    Ok(())
}
