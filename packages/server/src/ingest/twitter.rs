use std::collections::HashSet;

use clients::twitter::{TweetMedia, TweetThread};

use super::{Extraction, IngestError};
use crate::entity::content;
use crate::state::AppState;

const MAX_IMAGES: usize = 10;
const TITLE_CHARS: usize = 30;

/// Extract a tweet thread into an HTML fragment plus plain text.
///
/// Only same-author follow-ups count as part of the thread; replies from
/// other accounts are ignored.
pub async fn extract(
    state: &AppState,
    content: &content::Model,
) -> Result<Extraction, IngestError> {
    let source = content
        .source
        .as_deref()
        .ok_or_else(|| IngestError::Invalid("tweet row has no source URL".into()))?;
    let tweet_id = clients::twitter::parse_tweet_id(source)
        .ok_or_else(|| IngestError::Invalid(format!("not a tweet URL: {source}")))?;

    let thread = state.clients.twitter.thread(&tweet_id).await?;
    Ok(build_extraction(&thread))
}

fn build_extraction(thread: &TweetThread) -> Extraction {
    let main_author = thread.author.screen_name.as_str();
    let mut seen_photos = HashSet::new();
    let mut seen_videos = HashSet::new();

    let mut html_parts = vec![
        format!("<strong>{}</strong> ", escape_html(&thread.author.name)),
        format!("<span>@{}<br></span>", escape_html(main_author)),
        "<br>".to_owned(),
    ];
    let mut texts = Vec::new();

    if let Some(text) = thread.display_text.as_deref() {
        html_parts.push(format!("<p>{}</p>", escape_html(text)));
        texts.push(text.trim().to_owned());
    }
    if let Some(media) = &thread.media {
        push_media_html(&mut html_parts, media, &mut seen_photos, &mut seen_videos);
    }

    for tweet in thread.thread.as_deref().unwrap_or_default() {
        if tweet.author.screen_name != main_author {
            continue;
        }
        html_parts.push("<hr>".to_owned());
        if let Some(text) = tweet.display_text.as_deref() {
            html_parts.push(format!("<p>{}</p>", escape_html(text)));
            texts.push(text.trim().to_owned());
        }
        if let Some(media) = &tweet.media {
            push_media_html(&mut html_parts, media, &mut seen_photos, &mut seen_videos);
        }
    }

    let (cover, images) = collect_images(thread, main_author);

    Extraction {
        title: Some(derive_title(thread)),
        author: Some(thread.author.name.clone()),
        lang: thread.lang.clone(),
        published_time: thread
            .created_at
            .as_deref()
            .and_then(clients::twitter::parse_created_at),
        cover,
        images: (!images.is_empty()).then_some(images),
        content: Some(html_parts.join("\n")),
        text_content: Some(texts.join("\n")),
        ..Default::default()
    }
}

/// Render one tweet's photos and videos, skipping anything already shown
/// earlier in the thread.
fn push_media_html(
    html_parts: &mut Vec<String>,
    media: &TweetMedia,
    seen_photos: &mut HashSet<String>,
    seen_videos: &mut HashSet<String>,
) {
    let mut media_html = String::new();

    for photo in media.photo.as_deref().unwrap_or_default() {
        if let Some(url) = photo.media_url_https.as_deref()
            && seen_photos.insert(url.to_owned())
        {
            media_html.push_str(&format!("<img src=\"{url}\" alt=\"Tweet media\"><br>"));
        }
    }

    for video in media.video.as_deref().unwrap_or_default() {
        let Some(url) = video.best_mp4().and_then(|variant| variant.url.as_deref()) else {
            continue;
        };
        if !seen_videos.insert(url.to_owned()) {
            continue;
        }
        let (width, height) = video
            .original_info
            .as_ref()
            .map(|info| (info.width.unwrap_or(480), info.height.unwrap_or(270)))
            .unwrap_or((480, 270));
        media_html.push_str(&format!(
            "<video controls preload=\"metadata\" width=\"{width}\" height=\"{height}\">\
             <source src=\"{url}\" type=\"video/mp4\"></video><br>"
        ));
    }

    if !media_html.is_empty() {
        html_parts.push(media_html);
    }
}

/// Cover is the first main-tweet photo, falling back to a video poster
/// frame; images gather the whole thread's photos up to the cap.
fn collect_images(thread: &TweetThread, main_author: &str) -> (Option<String>, Vec<String>) {
    let mut images: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    if let Some(media) = &thread.media {
        for photo in media.photo.as_deref().unwrap_or_default() {
            if let Some(url) = photo.media_url_https.clone()
                && seen.insert(url.clone())
            {
                images.push(url);
            }
        }
    }

    let mut cover = images.first().cloned();
    if cover.is_none()
        && let Some(media) = &thread.media
    {
        cover = media
            .video
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find_map(|video| video.media_url_https.clone());
    }

    for tweet in thread.thread.as_deref().unwrap_or_default() {
        if tweet.author.screen_name != main_author {
            continue;
        }
        if let Some(media) = &tweet.media {
            for photo in media.photo.as_deref().unwrap_or_default() {
                if let Some(url) = photo.media_url_https.clone()
                    && seen.insert(url.clone())
                {
                    images.push(url);
                }
            }
        }
    }

    images.truncate(MAX_IMAGES);
    (cover, images)
}

fn derive_title(thread: &TweetThread) -> String {
    let text = thread
        .display_text
        .as_deref()
        .or(thread.text.as_deref())
        .unwrap_or_default();
    let title: String = text
        .trim()
        .replace('\n', " ")
        .chars()
        .take(TITLE_CHARS)
        .collect();
    if title.is_empty() {
        format!("Twitter thread by @{}", thread.author.screen_name)
    } else {
        title
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
