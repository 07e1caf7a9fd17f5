use clients::{ChatMessage, LlmClient};
use common::jobs::{EnrichJob, EnrichmentOutput};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::error::{Result, WorkerError};

const SUMMARY_SYSTEM: &str = "Create a clear and concise summary of the input content, in \
the same language as the input. Respond in markdown with exactly this layout:\n\
### **One-Sentence Hook**\n\
One engaging sentence that captures the content's core appeal.\n\
### **Key Points**\n\
- 3 to 6 bullets covering the main ideas, one per line\n\
### **Tags**\n\
- Up to 4 tags, each prefixed with #";

const STRUCTURE_SYSTEM: &str = "You are NotesGPT, an AI language model skilled at taking \
detailed, concise, and easy-to-understand notes on various subjects in bullet-point format. \
When provided with a passage or a topic, your task is to:\n\
- Create advanced bullet-point notes summarizing its important parts.\n\
- Choose an appropriate emoji for every heading level 2, summarize the content into one \
sentence as heading level 1, keep heading level 1 as short as possible, and make sure there \
are at least 3 heading level 2 sections.\n\
- Include all essential information, such as vocabulary terms and key concepts, which should \
be bolded with asterisks.\n\
- Remove any extraneous language, focusing only on the critical aspects of the passage.\n\
- Strictly base your notes on the provided content, without adding any outside information.\n\
Respond in markdown only, in the same language as the input, with no extra commentary.";

const MERMAID_SYSTEM: &str = "Turn the input content into a mermaid mindmap capturing its \
main ideas and how they relate. Respond with a JSON object containing exactly one key, \
\"mermaid\": a string of valid mermaid mindmap syntax. Write node labels in the same \
language as the input.";

const RECOMMEND_SYSTEM: &str = "Generate a one-sentence reason why this content is worth \
reading, based on its core value to the reader. Keep it accurate and concise, in the same \
language as the input, with no extra comments.";

const TAGS_SYSTEM: &str = "Extract tags for the input content.\n\
## Tagging guidelines\n\
- Use 4 tags maximum\n\
- Prefer standard terminology over informal variants\n\
- Avoid synonyms and repeated concepts\n\
- Tags must directly relate to the core themes\n\
- Combine related subtopics into one broader category tag\n\
Examples:\n\
- Machine learning article: [\"machine learning\", \"neural networks\", \"deep learning\"]\n\
- Cooking video: [\"cooking\", \"italian cuisine\", \"pasta\"]\n\
- Travel blog: [\"travel\", \"japan\", \"budget tips\"]\n\
Respond with a JSON object containing exactly one key, \"tag_list\": an array of tag \
strings in the same language as the input.";

const MAX_TAGS: usize = 4;

#[derive(Debug, Deserialize)]
struct TagsOutput {
    #[serde(default)]
    tag_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MermaidOutput {
    mermaid: String,
}

/// Run the enrichment steps for one job.
///
/// The summary is mandatory: its failure fails the whole job so the message
/// is retried. The remaining fields are each best-effort; a failure is
/// logged and the field left empty.
#[instrument(skip_all, fields(content_id = job.content_id, job_id = %job.job_id))]
pub async fn handle_enrich_job(job: &EnrichJob, llm: &LlmClient) -> Result<EnrichmentOutput> {
    info!(
        media_type = %job.media_type,
        source_len = job.source_text.len(),
        "Starting enrichment"
    );

    let summary = llm
        .complete(&[
            ChatMessage::system(SUMMARY_SYSTEM),
            ChatMessage::user(job.source_text.as_str()),
        ])
        .await?;
    if summary.trim().is_empty() {
        return Err(WorkerError::Job("Summary came back empty".to_string()));
    }

    let (structure, mermaid, recommend_reason, tags) = tokio::join!(
        generate_structure(llm, &job.source_text),
        generate_mermaid(llm, &job.source_text),
        generate_recommend_reason(llm, &job.source_text),
        generate_tags(llm, &job.source_text),
    );

    info!(
        structure = structure.is_some(),
        mermaid = mermaid.is_some(),
        recommend_reason = recommend_reason.is_some(),
        tags = tags.is_some(),
        "Enrichment finished"
    );

    Ok(EnrichmentOutput {
        summary,
        structure,
        mermaid,
        recommend_reason,
        tags,
    })
}

async fn generate_structure(llm: &LlmClient, source: &str) -> Option<String> {
    let result = llm
        .complete(&[
            ChatMessage::system(STRUCTURE_SYSTEM),
            ChatMessage::user(source),
        ])
        .await;
    match result {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Structure generation failed");
            None
        }
    }
}

async fn generate_mermaid(llm: &LlmClient, source: &str) -> Option<String> {
    let raw = match llm
        .complete_json(&[
            ChatMessage::system(MERMAID_SYSTEM),
            ChatMessage::user(source),
        ])
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Mermaid generation failed");
            return None;
        }
    };
    match serde_json::from_str::<MermaidOutput>(&raw) {
        Ok(output) if !output.mermaid.trim().is_empty() => Some(output.mermaid),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Mermaid output was not the expected JSON");
            None
        }
    }
}

async fn generate_recommend_reason(llm: &LlmClient, source: &str) -> Option<String> {
    let result = llm
        .complete(&[
            ChatMessage::system(RECOMMEND_SYSTEM),
            ChatMessage::user(source),
        ])
        .await;
    match result {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Recommend reason generation failed");
            None
        }
    }
}

async fn generate_tags(llm: &LlmClient, source: &str) -> Option<Vec<String>> {
    let raw = match llm
        .complete_json(&[ChatMessage::system(TAGS_SYSTEM), ChatMessage::user(source)])
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Tag generation failed");
            return None;
        }
    };
    match serde_json::from_str::<TagsOutput>(&raw) {
        Ok(output) if !output.tag_list.is_empty() => {
            let mut tags = output.tag_list;
            tags.truncate(MAX_TAGS);
            Some(tags)
        }
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Tag output was not the expected JSON");
            None
        }
    }
}
