use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target URL (e.g., http://localhost:8000)
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Number of employees to simulate
    #[arg(short = 'n', long, default_value_t = 100)]
    users: usize,

    /// Number of concurrent employees
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// Number of menus to spread the votes over
    #[arg(short, long, default_value_t = 3)]
    menus: usize,

    /// Administrator username
    #[arg(long, default_value = "admin")]
    admin_username: String,

    /// Administrator password
    #[arg(short, long, default_value = "password")]
    password: String,

    /// Leave the generated restaurant and employees in place
    #[arg(long)]
    keep: bool,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenPair {
    access_token: String,
}

#[derive(Serialize)]
struct RestaurantRequest<'a> {
    name: &'a str,
    resp_username: &'a str,
}

#[derive(Deserialize)]
struct Created {
    id: i32,
}

#[derive(Serialize)]
struct MenuRequest<'a> {
    restaurant_id: i32,
    resp_username: &'a str,
    first: &'a str,
    second: &'a str,
    drink: &'a str,
}

#[derive(Deserialize)]
struct Menu {
    id: i32,
    number_votes: i32,
}

#[derive(Serialize)]
struct EmployeeRequest<'a> {
    name: &'a str,
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CastVoteRequest {
    employee_id: i32,
    menu_id: i32,
}

/// What one simulated employee observed.
enum Outcome {
    /// Vote accepted and the same-day retry refused.
    Voted,
    /// Vote accepted but the retry was accepted too.
    DoubleVoted,
}

fn run_tag() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

async fn login(client: &Client, base_url: &str, username: &str, password: &str) -> Result<String> {
    let pair: TokenPair = client
        .post(format!("{}/auth/login", base_url))
        .json(&LoginRequest { username, password })
        .send()
        .await
        .context("Failed to send login request")?
        .error_for_status()
        .with_context(|| format!("Login failed for {}", username))?
        .json()
        .await
        .context("Failed to parse tokens")?;

    Ok(pair.access_token)
}

async fn run_employee_simulation(
    client: &Client,
    base_url: &str,
    admin_token: &str,
    tag: &str,
    user_id: usize,
    menu_ids: &[i32],
) -> Result<(i32, Outcome)> {
    // 1. Provision the employee
    let username = format!("lt_{}_{}", tag, user_id);
    let email = format!("{}@load.test", username);
    let employee: Created = client
        .post(format!("{}/employees", base_url))
        .bearer_auth(admin_token)
        .json(&EmployeeRequest {
            name: &username,
            username: &username,
            email: &email,
            password: &username,
        })
        .send()
        .await
        .context("Failed to send employee request")?
        .error_for_status()
        .context("Employee creation failed")?
        .json()
        .await
        .context("Failed to parse employee")?;

    // 2. Log in as that employee
    let token = login(client, base_url, &username, &username).await?;

    // 3. Vote for a random menu
    let menu_id = *menu_ids
        .choose(&mut thread_rng())
        .context("No menus available")?;
    let vote = CastVoteRequest {
        employee_id: employee.id,
        menu_id,
    };

    let status = client
        .post(format!("{}/votes", base_url))
        .bearer_auth(&token)
        .json(&vote)
        .send()
        .await
        .context("Failed to send vote request")?
        .status();
    if status != StatusCode::CREATED {
        bail!("Vote casting failed with {}", status);
    }

    // 4. Try again the same day; the ledger must refuse
    let retry = client
        .post(format!("{}/votes", base_url))
        .bearer_auth(&token)
        .json(&vote)
        .send()
        .await
        .context("Failed to send retry request")?
        .status();

    let outcome = if retry == StatusCode::BAD_REQUEST {
        Outcome::Voted
    } else {
        Outcome::DoubleVoted
    };

    Ok((employee.id, outcome))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new();
    let tag = run_tag();

    println!("🚀 Starting load test against {}", args.url);
    println!("👥 Employees: {}", args.users);
    println!("⚡ Concurrency: {}", args.concurrency);

    // 0. Setup: administrator session, one restaurant, a few menus
    let admin_token = login(&client, &args.url, &args.admin_username, &args.password).await?;
    println!("🔑 Logged in as {}", args.admin_username);

    let restaurant_name = format!("Load test {}", tag);
    let restaurant: Created = client
        .post(format!("{}/restaurants", args.url))
        .bearer_auth(&admin_token)
        .json(&RestaurantRequest {
            name: &restaurant_name,
            resp_username: &args.admin_username,
        })
        .send()
        .await
        .context("Failed to create restaurant")?
        .error_for_status()
        .context("Restaurant creation failed")?
        .json()
        .await
        .context("Failed to parse restaurant")?;

    let mut menu_ids = Vec::with_capacity(args.menus.max(1));
    for i in 0..args.menus.max(1) {
        let first = format!("soup {}", i);
        let menu: Created = client
            .post(format!("{}/menus", args.url))
            .bearer_auth(&admin_token)
            .json(&MenuRequest {
                restaurant_id: restaurant.id,
                resp_username: &args.admin_username,
                first: &first,
                second: "rice",
                drink: "tea",
            })
            .send()
            .await
            .context("Failed to create menu")?
            .error_for_status()
            .context("Menu creation failed")?
            .json()
            .await
            .context("Failed to parse menu")?;
        menu_ids.push(menu.id);
    }
    println!(
        "📋 Restaurant {} with {} menus ready",
        restaurant.id,
        menu_ids.len()
    );

    let menu_ids = Arc::new(menu_ids);
    let base_url = Arc::new(args.url.clone());
    let admin_token = Arc::new(admin_token);
    let tag = Arc::new(tag);

    let success_count = Arc::new(AtomicUsize::new(0));
    let double_count = Arc::new(AtomicUsize::new(0));
    let failure_count = Arc::new(AtomicUsize::new(0));

    let pb = ProgressBar::new(args.users as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let start_time = Instant::now();

    let employee_ids = stream::iter(0..args.users)
        .map(|i| {
            let client = client.clone();
            let base_url = base_url.clone();
            let admin_token = admin_token.clone();
            let tag = tag.clone();
            let menu_ids = menu_ids.clone();
            let success_count = success_count.clone();
            let double_count = double_count.clone();
            let failure_count = failure_count.clone();
            let pb = pb.clone();

            async move {
                let result =
                    run_employee_simulation(&client, &base_url, &admin_token, &tag, i, &menu_ids)
                        .await;

                let employee_id = match result {
                    Ok((id, Outcome::Voted)) => {
                        success_count.fetch_add(1, Ordering::Relaxed);
                        Some(id)
                    }
                    Ok((id, Outcome::DoubleVoted)) => {
                        success_count.fetch_add(1, Ordering::Relaxed);
                        double_count.fetch_add(1, Ordering::Relaxed);
                        Some(id)
                    }
                    Err(e) => {
                        failure_count.fetch_add(1, Ordering::Relaxed);
                        pb.println(format!("❌ employee {}: {:#}", i, e));
                        None
                    }
                };
                pb.set_message(format!(
                    "Votes: {} Errors: {}",
                    success_count.load(Ordering::Relaxed),
                    failure_count.load(Ordering::Relaxed)
                ));
                pb.inc(1);
                employee_id
            }
        })
        .buffer_unordered(args.concurrency.max(1))
        .filter_map(|id| async move { id })
        .collect::<Vec<i32>>()
        .await;

    pb.finish_with_message("Done");
    let duration = start_time.elapsed();

    // 1. Every accepted vote must show up in exactly one tally
    let mut tallied = 0;
    for menu_id in menu_ids.iter() {
        let menu: Menu = client
            .get(format!("{}/menus/{}", args.url, menu_id))
            .bearer_auth(admin_token.as_str())
            .send()
            .await
            .context("Failed to fetch menu")?
            .error_for_status()
            .context("Menu lookup failed")?
            .json()
            .await
            .context("Failed to parse menu")?;
        println!("   Menu {}: {} vote(s)", menu.id, menu.number_votes);
        tallied += menu.number_votes as usize;
    }

    let successes = success_count.load(Ordering::Relaxed);
    let doubles = double_count.load(Ordering::Relaxed);
    let failures = failure_count.load(Ordering::Relaxed);
    let rps = successes as f64 / duration.as_secs_f64();

    println!("\n📊 Results:");
    println!("   Time taken: {:?}", duration);
    println!("   Employees simulated: {}", args.users);
    println!("   Employees who voted: {}", successes);
    println!("   Duplicates rejected: {}", successes - doubles);
    println!("   Duplicate votes accepted: {}", doubles);
    println!("   Failed employees: {}", failures);
    println!("   Votes tallied: {}", tallied);
    println!("   Throughput: {:.2} votes/sec", rps);

    if !args.keep {
        for id in &employee_ids {
            client
                .delete(format!("{}/employees/{}", args.url, id))
                .bearer_auth(admin_token.as_str())
                .send()
                .await
                .context("Failed to delete employee")?;
        }
        client
            .delete(format!("{}/restaurants/{}", args.url, restaurant.id))
            .bearer_auth(admin_token.as_str())
            .send()
            .await
            .context("Failed to delete restaurant")?;
        println!("🧹 Removed {} employees and the restaurant", employee_ids.len());
    }

    if doubles > 0 {
        bail!("{} employees managed to vote twice in one day", doubles);
    }
    if tallied != successes + doubles {
        bail!(
            "Tally mismatch: {} votes accepted but {} counted",
            successes + doubles,
            tallied
        );
    }

    println!("✅ Ledger consistent");
    Ok(())
}
