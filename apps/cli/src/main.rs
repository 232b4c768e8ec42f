use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use client_core::{
    account::{self, SignupForm},
    config::{load_settings, load_settings_from, ClientSettings},
    format,
    intake::DecodingProbe,
    preview::ObjectUrlStore,
    AssetIntakeController, CandidateFile, FieldValue, HttpRemote, Liveness, MediaPolicy,
    ProfileField, ProfileView, RemovalOutcome,
};
use shared::{
    domain::{Gender, PostId},
    protocol::Credentials,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const TOKEN_VAR: &str = "SOCIAL_ACCESS_TOKEN";

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; defaults to ./client.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Access token; falls back to $SOCIAL_ACCESS_TOKEN.
    #[arg(long)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_parser = parse_date)]
        birth_date: Option<NaiveDate>,
        #[arg(long, value_parser = parse_gender)]
        gender: Option<Gender>,
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    #[command(subcommand)]
    Profile(ProfileCommand),
    #[command(subcommand)]
    Post(PostCommand),
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,
    Edit {
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_date)]
        birth_date: Option<NaiveDate>,
        #[arg(long, value_parser = parse_gender)]
        gender: Option<Gender>,
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum PostCommand {
    Create {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        caption: String,
    },
    Delete {
        #[arg(long)]
        id: i64,
        /// Without this flag the post is only armed for removal.
        #[arg(long)]
        confirm: bool,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn parse_gender(raw: &str) -> Result<Gender, String> {
    Gender::parse(raw).ok_or_else(|| "expected male, female or other".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings()?,
    };
    let remote = HttpRemote::new(&settings)?;

    match cli.command {
        Command::Signup {
            name,
            email,
            password,
            birth_date,
            gender,
            avatar,
        } => {
            let form = SignupForm {
                name,
                birth_date,
                email,
                password: password.clone(),
                password_confirmation: password,
                gender,
            };
            let mut intake = AssetIntakeController::new(
                MediaPolicy::avatar(&settings),
                Arc::new(DecodingProbe),
                ObjectUrlStore::new(),
                Liveness::new(),
            );
            if let Some(path) = avatar {
                intake.select(read_candidate(&path).await?).await?;
            }
            let tokens = account::register(&remote, &form, &mut intake).await?;
            println!("{}", tokens.access);
        }
        Command::Login { email, password } => {
            let tokens = account::login(&remote, Credentials { email, password }).await?;
            println!("{}", tokens.access);
        }
        Command::Profile(command) => {
            let mut view = open_view(remote, cli.token, &settings).await?;
            match command {
                ProfileCommand::Show => {}
                ProfileCommand::Edit {
                    name,
                    birth_date,
                    gender,
                    avatar,
                } => {
                    stage(&mut view, ProfileField::Name, name.map(FieldValue::Name));
                    stage(
                        &mut view,
                        ProfileField::BirthDate,
                        birth_date.map(|d| FieldValue::BirthDate(Some(d))),
                    );
                    stage(
                        &mut view,
                        ProfileField::Gender,
                        gender.map(|g| FieldValue::Gender(Some(g))),
                    );
                    if let Some(path) = avatar {
                        view.select_avatar(read_candidate(&path).await?).await?;
                    }
                    view.commit().await?;
                    info!("profile updated");
                }
            }
            print_profile(&view);
        }
        Command::Post(PostCommand::Create { image, caption }) => {
            let mut view = open_view(remote, cli.token, &settings).await?;
            view.select_post_image(read_candidate(&image).await?).await?;
            let created = view.publish_post(&caption).await?;
            println!("created post {}", created.id);
        }
        Command::Post(PostCommand::Delete { id, confirm }) => {
            let mut view = open_view(remote, cli.token, &settings).await?;
            let post_id = PostId(id);
            let mut outcome = view.remove_post(post_id).await?;
            if confirm && outcome == RemovalOutcome::Armed {
                outcome = view.remove_post(post_id).await?;
            }
            match outcome {
                RemovalOutcome::Armed => {
                    println!("post {id} armed; repeat with --confirm to delete")
                }
                RemovalOutcome::Removed(_) => println!("deleted post {id}"),
                RemovalOutcome::Ignored => return Err(anyhow!("no post {id} on this profile")),
            }
        }
    }

    Ok(())
}

async fn open_view(
    remote: HttpRemote,
    token: Option<String>,
    settings: &ClientSettings,
) -> Result<ProfileView> {
    let token = token
        .or_else(|| std::env::var(TOKEN_VAR).ok())
        .ok_or_else(|| anyhow!("an access token is required (--token or ${TOKEN_VAR})"))?;
    let mut view = ProfileView::new(Arc::new(remote.with_access_token(token)), settings);
    view.load().await?;
    Ok(view)
}

fn stage(view: &mut ProfileView, field: ProfileField, value: Option<FieldValue>) {
    if let Some(value) = value {
        view.begin_edit(field);
        view.set_pending(value);
    }
}

async fn read_candidate(path: &std::path::Path) -> Result<CandidateFile> {
    CandidateFile::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

fn print_profile(view: &ProfileView) {
    let Some(profile) = view.record() else {
        return;
    };
    println!("{} <{}>", profile.name, profile.email);
    println!("born:   {}", format::optional_birth_date(profile.birth_date));
    println!(
        "gender: {}",
        profile.gender.map(|g| g.as_str()).unwrap_or("-")
    );
    if let Some(avatar) = view.avatar_display() {
        println!("avatar: {avatar}");
    }
    for post in view.posts() {
        println!(
            "#{:<5} {}  {}  (+{} / -{})",
            post.id,
            format::posted_on(post.created_at),
            post.caption,
            post.like_count,
            post.dislike_count
        );
    }
}
