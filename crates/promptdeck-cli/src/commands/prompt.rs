//! Prompt command handlers
//!
//! Validation happens here, before anything reaches the store: labels and
//! prompts are trimmed and must not be empty.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};

use promptdeck_core::{PromptDraft, PromptItem, PromptQueries};

use crate::editor::confirm;
use crate::output::Output;

/// List all prompts
pub async fn list(queries: &PromptQueries, output: &Output) -> Result<()> {
    let items = load(queries).await?;
    output.print_items(&items);
    Ok(())
}

/// Show one prompt
pub async fn show(queries: &PromptQueries, id: String, output: &Output) -> Result<()> {
    let items = load(queries).await?;
    let item = resolve_item(&items, &id)?;
    output.print_item(item);
    Ok(())
}

/// Add a new prompt at the end of the list
pub async fn create(
    queries: &PromptQueries,
    label: String,
    prompt: String,
    color: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut item = PromptDraft::new(label, prompt).into_item()?;
    item.color = color;

    let items = load(queries).await?;
    item.order = Some(items.len() as u32);

    queries
        .save_item()
        .mutate_async(item.clone())
        .await
        .context("Failed to add prompt")?;

    output.success(&format!("Added prompt {} ({})", item.label, item.id));
    Ok(())
}

/// Edit an existing prompt, keeping its id and position
pub async fn edit(
    queries: &PromptQueries,
    id: String,
    label: Option<String>,
    prompt: Option<String>,
    color: Option<String>,
    output: &Output,
) -> Result<()> {
    if label.is_none() && prompt.is_none() && color.is_none() {
        bail!("Nothing to change. Pass --label, --prompt or --color.");
    }

    let items = load(queries).await?;
    let mut item = resolve_item(&items, &id)?.clone();

    let draft = PromptDraft::new(
        label.unwrap_or_else(|| item.label.clone()),
        prompt.unwrap_or_else(|| item.prompt.clone()),
    );
    let (label, prompt) = draft.validate()?;
    item.set_label(label);
    item.set_prompt(prompt);
    if color.is_some() {
        item.color = color;
    }

    queries
        .save_item()
        .mutate_async(item.clone())
        .await
        .context("Failed to update prompt")?;

    output.success(&format!("Updated prompt {} ({})", item.label, item.id));
    Ok(())
}

/// Delete a prompt
pub async fn delete(queries: &PromptQueries, id: String, yes: bool, output: &Output) -> Result<()> {
    let items = load(queries).await?;
    let item = resolve_item(&items, &id)?;

    if !yes && output.should_prompt() {
        println!("Delete prompt: {} - {}", item.id, item.label);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    queries
        .delete_item()
        .mutate_async(item.id.clone())
        .await
        .context("Failed to delete prompt")?;

    output.success(&format!("Deleted prompt: {}", item.label));
    Ok(())
}

/// Move the given prompts to the front, in the given order
pub async fn reorder(queries: &PromptQueries, ids: Vec<String>, output: &Output) -> Result<()> {
    let items = load(queries).await?;
    let reordered = reorder_items(items, &ids)?;

    queries
        .save_all()
        .mutate_async(reordered.clone())
        .await
        .context("Failed to save prompt order")?;

    output.success("Saved prompt order");
    output.print_items(&reordered);
    Ok(())
}

/// Seed the default prompts into an empty collection
pub async fn init(queries: &PromptQueries, output: &Output) -> Result<()> {
    let seeded = queries
        .service()
        .initialize_defaults()
        .await
        .context("Failed to initialize default prompts")?;

    if seeded {
        queries.refresh();
        output.success("Initialized default prompts");
    } else {
        output.message("Prompts already exist, nothing to initialize.");
    }
    Ok(())
}

/// Read the list through the query cache
async fn load(queries: &PromptQueries) -> Result<Vec<PromptItem>> {
    let state = queries.list().await;
    if let Some(error) = state.error {
        bail!("Failed to load prompts: {}", error);
    }
    Ok(state.data.unwrap_or_default())
}

/// Find a prompt by full id or unique id prefix
fn resolve_item<'a>(items: &'a [PromptItem], id: &str) -> Result<&'a PromptItem> {
    if let Some(item) = items.iter().find(|item| item.id == id) {
        return Ok(item);
    }

    let matches: Vec<_> = items.iter().filter(|i| i.id.starts_with(id)).collect();
    match matches.len() {
        0 => bail!("No prompt found matching: {}", id),
        1 => Ok(matches[0]),
        _ => {
            eprintln!("Multiple prompts match '{}':", id);
            for item in &matches {
                eprintln!("  {} - {}", item.id, item.label);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// Put the records named by `ids` first; the rest keep their relative order
fn reorder_items(items: Vec<PromptItem>, ids: &[String]) -> Result<Vec<PromptItem>> {
    if ids.is_empty() {
        bail!("Pass at least one prompt id to move to the front.");
    }

    let mut front = Vec::with_capacity(ids.len());
    for id in ids {
        let item = resolve_item(&items, id)?;
        if front.iter().any(|f: &PromptItem| f.id == item.id) {
            bail!("Prompt {} listed more than once", item.id);
        }
        front.push(item.clone());
    }

    let moved: HashSet<String> = front.iter().map(|item| item.id.clone()).collect();
    front.extend(items.into_iter().filter(|item| !moved.contains(&item.id)));
    Ok(front)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use promptdeck_core::{Collection, PromptService, QueryStatus, ValidationError, DEFAULT_COLOR};

    use crate::output::OutputFormat;

    fn queries(collection: Collection) -> PromptQueries {
        PromptQueries::new(Arc::new(PromptService::in_memory(collection)))
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    fn items() -> Vec<PromptItem> {
        promptdeck_core::default_prompt_items()
    }

    fn ids(items: &[PromptItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_resolve_exact_and_prefix() {
        let mut list = items();
        list.push(PromptItem::with_id("1700000000001", "A", "a"));
        list.push(PromptItem::with_id("1700000000002", "B", "b"));

        // Exact match wins over prefix ambiguity
        assert_eq!(resolve_item(&list, "1").unwrap().label, "Summarize");
        assert!(resolve_item(&list, "17000000000012").is_err());
        assert_eq!(resolve_item(&list, "1700000000002").unwrap().label, "B");
        assert!(resolve_item(&list, "170").is_err());
        assert!(resolve_item(&list, "9").is_err());
    }

    #[test]
    fn test_reorder_moves_to_front() {
        let reordered =
            reorder_items(items(), &["3".to_string(), "1".to_string()]).unwrap();
        assert_eq!(ids(&reordered), ["3", "1", "2", "4"]);
    }

    #[test]
    fn test_reorder_rejects_duplicates_and_empty() {
        assert!(reorder_items(items(), &["2".to_string(), "2".to_string()]).is_err());
        assert!(reorder_items(items(), &[]).is_err());
        assert!(reorder_items(items(), &["missing".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_blank_label_is_rejected_before_any_read() {
        let queries = queries(Collection::Topics);

        let err = create(&queries, "   ".into(), "Explain it".into(), None, &quiet())
            .await
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::EmptyLabel)
        );
        assert_eq!(queries.state().status, QueryStatus::Idle);
        assert!(queries.service().get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_edit_delete() {
        let queries = queries(Collection::Topics);
        let output = quiet();

        create(
            &queries,
            " Economy ".into(),
            " Explain the markets ".into(),
            None,
            &output,
        )
        .await
        .unwrap();

        let items = queries.list().await.data.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "Economy");
        assert_eq!(items[0].prompt, "Explain the markets");
        assert_eq!(items[0].order, Some(0));
        assert_eq!(items[0].color.as_deref(), Some(DEFAULT_COLOR));
        let id = items[0].id.clone();

        edit(&queries, id.clone(), Some("Markets".into()), None, None, &output)
            .await
            .unwrap();
        let items = queries.list().await.data.unwrap();
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].label, "Markets");
        assert_eq!(items[0].prompt, "Explain the markets");
        assert_eq!(items[0].order, Some(0));

        // A blank prompt is rejected and the record stays as it was
        assert!(edit(&queries, id.clone(), None, Some("  ".into()), None, &output)
            .await
            .is_err());
        assert_eq!(
            queries.list().await.data.unwrap()[0].prompt,
            "Explain the markets"
        );

        delete(&queries, id, true, &output).await.unwrap();
        assert_eq!(queries.list().await.data, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_reorder_and_init() {
        let queries = queries(Collection::Topics);
        let output = quiet();

        init(&queries, &output).await.unwrap();
        assert_eq!(queries.list().await.data.map(|items| items.len()), Some(4));
        // Already seeded
        init(&queries, &output).await.unwrap();
        assert_eq!(queries.list().await.data.map(|items| items.len()), Some(4));

        reorder(&queries, vec!["4".to_string()], &output).await.unwrap();

        let items = queries.list().await.data.unwrap();
        assert_eq!(ids(&items), ["4", "1", "2", "3"]);
        let orders: Vec<_> = items.iter().map(|i| i.order).collect();
        assert_eq!(orders, [Some(0), Some(1), Some(2), Some(3)]);
    }
}
