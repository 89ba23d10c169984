//! Server-rendered HTML pages.
//!
//! Markup is assembled with `format!`; every value that came from a client
//! (file names, authors, comment bodies) goes through `html_escape` first.

use axum::response::Html;
use gallery_store::{Image, Message};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::flash::FlashMessage;

/// URL prefix the upload root is served under.
pub const UPLOADS_URL_PREFIX: &str = "/static/uploads";

const STYLE: &str = "body{font-family:sans-serif;margin:2rem auto;max-width:60rem}\
nav a{margin-right:1rem}\
.flash{padding:.5rem 1rem;border-radius:4px;margin:.5rem 0}\
.flash.success{background:#e6f6e6}.flash.error{background:#fbe3e3}\
.gallery img{max-width:100%;display:block;margin:1rem 0}\
.thumbs{display:flex;flex-wrap:wrap;gap:.5rem}\
.thumbs img{width:150px;height:150px;object-fit:cover}\
.message{border-bottom:1px solid #ddd;padding:.5rem 0}";

pub fn image_url(image: &Image) -> String {
    format!("{UPLOADS_URL_PREFIX}/{}", image.path)
}

fn layout(title: &str, flashes: &[FlashMessage], body: &str) -> Html<String> {
    let mut notices = String::new();
    for flash in flashes {
        notices.push_str(&format!(
            "<div class=\"flash {}\">{}</div>",
            flash.level.css_class(),
            text(&flash.message)
        ));
    }

    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
<style>{STYLE}</style></head><body>\
<nav><a href=\"/\">Home</a><a href=\"/gallery\">Gallery</a><a href=\"/thumbnail_view\">Thumbnails</a>\
<a href=\"/upload\">Upload</a><a href=\"/batch_upload\">Batch upload</a></nav>\
{notices}{body}</body></html>",
        title = text(title),
    ))
}

pub fn landing(flashes: &[FlashMessage]) -> Html<String> {
    layout(
        "Our Gallery",
        flashes,
        "<h1>Our Gallery</h1>\
<p>Share your favourite pictures and leave a note on each one.</p>\
<p><a href=\"/gallery\">Open the gallery</a> or <a href=\"/upload\">upload a picture</a>.</p>",
    )
}

pub fn gallery(images: &[Image], flashes: &[FlashMessage]) -> Html<String> {
    let mut items = String::new();
    for image in images {
        items.push_str(&format!(
            "<figure><img src=\"{src}\" alt=\"{alt}\"><figcaption>{name} \
<a href=\"/add_message/{id}\">Messages</a></figcaption></figure>",
            src = attr(&image_url(image)),
            alt = attr(&image.filename),
            name = text(&image.filename),
            id = image.id,
        ));
    }
    if items.is_empty() {
        items.push_str("<p>No images yet.</p>");
    }
    layout(
        "Gallery",
        flashes,
        &format!("<h1>Gallery</h1><div class=\"gallery\">{items}</div>"),
    )
}

pub fn thumbnail_view(images: &[Image], flashes: &[FlashMessage]) -> Html<String> {
    let mut items = String::new();
    for image in images {
        items.push_str(&format!(
            "<a href=\"/add_message/{id}\"><img src=\"{src}\" alt=\"{alt}\" loading=\"lazy\"></a>",
            id = image.id,
            src = attr(&image_url(image)),
            alt = attr(&image.filename),
        ));
    }
    if items.is_empty() {
        items.push_str("<p>No images yet.</p>");
    }
    layout(
        "Thumbnails",
        flashes,
        &format!("<h1>Thumbnails</h1><div class=\"thumbs\">{items}</div>"),
    )
}

pub fn upload_form(flashes: &[FlashMessage], notice: Option<&str>) -> Html<String> {
    let notice = notice
        .map(|n| format!("<p class=\"flash error\">{}</p>", text(n)))
        .unwrap_or_default();
    layout(
        "Upload",
        flashes,
        &format!(
            "<h1>Upload an image</h1>{notice}\
<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
<input type=\"file\" name=\"file\" accept=\"image/*\"> <button type=\"submit\">Upload</button></form>"
        ),
    )
}

pub fn batch_upload_form(flashes: &[FlashMessage]) -> Html<String> {
    layout(
        "Batch upload",
        flashes,
        "<h1>Upload several images</h1>\
<form method=\"post\" action=\"/batch_upload\" enctype=\"multipart/form-data\">\
<input type=\"file\" name=\"files\" accept=\"image/*\" multiple> <button type=\"submit\">Upload all</button></form>",
    )
}

/// Comment list without any page chrome, for embedding.
pub fn messages_partial(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "<div class=\"messages\"><p>No messages yet.</p></div>".to_string();
    }
    let mut out = String::from("<div class=\"messages\">");
    for message in messages {
        out.push_str(&format!(
            "<div class=\"message\"><strong>{author}</strong> \
<small>{when}</small><p>{content}</p></div>",
            author = text(&message.author),
            when = message.timestamp.format("%Y-%m-%d %H:%M UTC"),
            content = text(&message.content),
        ));
    }
    out.push_str("</div>");
    out
}

pub fn add_message(image: &Image, messages: &[Message], flashes: &[FlashMessage]) -> Html<String> {
    layout(
        "Messages",
        flashes,
        &format!(
            "<h1>{name}</h1><img src=\"{src}\" alt=\"{alt}\" style=\"max-width:100%\">\
<form method=\"post\" action=\"/add_message/{id}\">\
<p><label>Name <input name=\"author\" maxlength=\"{max}\" required></label></p>\
<p><label>Message <textarea name=\"content\" required></textarea></label></p>\
<button type=\"submit\">Post</button></form>{thread}",
            name = text(&image.filename),
            src = attr(&image_url(image)),
            alt = attr(&image.filename),
            id = image.id,
            max = gallery_store::MAX_AUTHOR_LEN,
            thread = messages_partial(messages),
        ),
    )
}
