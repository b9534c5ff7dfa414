use poise::serenity_prelude::*;

use crate::{
    constants::quotes::{ALL_CATEGORIES, EXPORT_FILE_NAME},
    errors::QuoteError,
    models::quotes::Quote,
    Context, Error,
};

const MAX_IMPORT_BYTES: u32 = 1024 * 1024;

fn render(quote: &Quote) -> String {
    format!("\"{}\"\n- {}", quote.text, quote.category)
}

async fn reply(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .reply(true)
            .allowed_mentions(CreateAllowedMentions::new().replied_user(false))
            .content(content),
    )
    .await
    .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when sending reply"))?;

    Ok(())
}

/// show a random quote, optionally from a single category.
///
/// without a category, the last filter picked with `s>quote filter` is used.
#[tracing::instrument(skip(ctx))]
#[poise::command(
    prefix_command,
    aliases("quotes"),
    subcommands(
        "add_quote",
        "filter_quotes",
        "list_categories",
        "export_quotes",
        "import_quotes",
        "sync_quotes"
    )
)]
pub async fn quote(ctx: Context<'_>, #[rest] category: Option<String>) -> Result<(), Error> {
    let category = category.as_deref().map(str::trim).filter(|c| !c.is_empty());

    match ctx.data().quotes.random_quote(category).await {
        Ok(quote) => reply(ctx, render(&quote)).await,
        Err(QuoteError::EmptyInput) => reply(ctx, "no quotes found for this category.").await,
        Err(e) => Err(e.into()),
    }
}

/// add a quote: `s>quote add <category> <text>`.
#[poise::command(prefix_command, rename = "add")]
#[tracing::instrument(skip(ctx))]
pub async fn add_quote(
    ctx: Context<'_>,
    category: String,
    #[rest] text: String,
) -> Result<(), Error> {
    match ctx.data().quotes.add_quote(&text, &category).await {
        Ok(added) if added.pushed => {
            reply(ctx, "quote added locally & sent to server.").await
        }
        Ok(_) => {
            reply(
                ctx,
                "quote added locally, but it couldn't be sent to the server.",
            )
            .await
        }
        Err(e @ (QuoteError::Validation | QuoteError::IdsExhausted)) => {
            reply(ctx, e.to_string()).await
        }
        Err(e) => Err(e.into()),
    }
}

/// pick the category used by `s>quote`. use `all` to clear it.
#[poise::command(prefix_command, rename = "filter")]
#[tracing::instrument(skip(ctx))]
pub async fn filter_quotes(ctx: Context<'_>, #[rest] category: String) -> Result<(), Error> {
    let quote = ctx.data().quotes.select_filter(&category).await.inspect_err(
        |e| tracing::error!(err = ?e, category = %category, "an error occurred when selecting filter"),
    )?;

    match quote {
        Some(quote) => reply(ctx, render(&quote)).await,
        None => reply(ctx, "no quotes found for this category.").await,
    }
}

/// list every category.
#[poise::command(prefix_command, rename = "categories")]
#[tracing::instrument(skip_all)]
pub async fn list_categories(ctx: Context<'_>) -> Result<(), Error> {
    let quotes = &ctx.data().quotes;
    let selected = quotes.last_filter().await;

    let mut lines = vec![];

    for category in std::iter::once(ALL_CATEGORIES.to_string()).chain(quotes.categories().await) {
        let count = quotes.filter(&category).await.len();
        let marker = if category.eq_ignore_ascii_case(&selected) {
            " (selected)"
        } else {
            ""
        };

        lines.push(format!("- {category}: {count}{marker}"));
    }

    ctx.send(
        poise::CreateReply::default().embed(
            CreateEmbed::default()
                .title("quote categories")
                .description(lines.join("\n")),
        ),
    )
    .await
    .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when sending reply"))?;

    Ok(())
}

/// download every quote as a JSON file.
#[poise::command(prefix_command, rename = "export")]
#[tracing::instrument(skip_all)]
pub async fn export_quotes(ctx: Context<'_>) -> Result<(), Error> {
    let json = ctx.data().quotes.export_json().await.inspect_err(
        |e| tracing::error!(err = ?e, "an error occurred when exporting quotes"),
    )?;

    ctx.send(
        poise::CreateReply::default()
            .content("here's your quotes!")
            .attachment(CreateAttachment::bytes(json.into_bytes(), EXPORT_FILE_NAME)),
    )
    .await
    .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when sending reply"))?;

    Ok(())
}

/// import quotes from an attached JSON file.
#[poise::command(prefix_command, rename = "import")]
#[tracing::instrument(skip_all)]
pub async fn import_quotes(ctx: Context<'_>, file: Attachment) -> Result<(), Error> {
    if file.size > MAX_IMPORT_BYTES {
        return reply(ctx, "that file is too big to be a quotes file!").await;
    }

    let bytes = file.download().await.inspect_err(
        |e| tracing::error!(err = ?e, filename = %file.filename, "an error occurred when downloading attachment"),
    )?;

    match ctx.data().quotes.import_bytes(&bytes).await {
        Ok(count) => reply(ctx, format!("imported {count} quotes successfully!")).await,
        Err(e @ QuoteError::Format(_)) => {
            tracing::warn!(err = ?e, filename = %file.filename, "rejected quotes file");
            reply(ctx, "invalid JSON file!").await
        }
        Err(e @ QuoteError::IdsExhausted) => reply(ctx, e.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

/// sync with the quote server right now.
#[poise::command(prefix_command, rename = "sync")]
#[tracing::instrument(skip_all)]
pub async fn sync_quotes(ctx: Context<'_>) -> Result<(), Error> {
    match ctx.data().quotes.pull().await {
        Ok(Some(report)) if report.changed() => {
            reply(
                ctx,
                format!(
                    "synced! {} new quotes, {} updated from server.",
                    report.appended,
                    report.conflicts.len()
                ),
            )
            .await
        }
        Ok(Some(_)) => reply(ctx, "synced! everything was already up to date.").await,
        Ok(None) => reply(ctx, "a sync is already running, try again in a bit.").await,
        Err(e @ QuoteError::Sync(_)) => reply(ctx, e.to_string()).await,
        Err(e) => Err(e.into()),
    }
}
