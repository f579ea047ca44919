//! Server-rendered HTML pages.

use crate::database::schema::bitdoc::BitdocSchema;
use crate::utils::html_escape;

const STYLE: &str = "body{font-family:sans-serif;margin:2em;background:#222;color:#eee}\
a{color:#9cf}.button{padding:.3em .8em;border:1px solid #9cf;border-radius:4px}\
.entry{display:inline-block;margin:1em;vertical-align:top}.entry img{max-width:256px}";

pub fn greeting(nickname: Option<&str>) -> String {
    match nickname {
        Some(nickname) => format!(
            "Logged in as {}. <form method=\"post\" action=\"/logout\" style=\"display:inline\">\
             <button class=\"button\">Log Out</button></form>",
            html_escape(nickname)
        ),
        None => "<a href=\"/login\" class=\"button\">Please log in.</a>".to_string(),
    }
}

fn page(title: &str, greeting: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body>\
         <header><a href=\"/\">SmashPix</a> | <a href=\"/upload\">Upload</a> | {greeting}</header>\
         <h1>{title}</h1>{body}</body></html>"
    )
}

fn entry_card(bitdoc: &BitdocSchema) -> String {
    let key = html_escape(&bitdoc.key);
    let processed = match &bitdoc.image_8bit_link {
        Some(link) => format!(
            "<a href=\"/get/{key}\"><img src=\"{}\" alt=\"8-bit\"></a><br>8-bit at {}",
            html_escape(link),
            bitdoc.timestamp_8bit_strsafe().unwrap_or_default()
        ),
        None => "<em>Processing...</em>".to_string(),
    };
    format!(
        "<div class=\"entry\"><a href=\"/get/{key}\"><img src=\"{}\" alt=\"original\"></a><br>\
         {} by {} at {}<br>{processed}\
         <form method=\"post\" action=\"/delete\"><input type=\"hidden\" name=\"id\" value=\"{key}\">\
         <button class=\"button\">Delete</button></form></div>",
        html_escape(&bitdoc.image_link),
        bitdoc.file_name_strsafe().unwrap_or_default(),
        html_escape(&bitdoc.user),
        bitdoc.timestamp_strsafe().unwrap_or_default(),
    )
}

pub fn index(greeting: &str, bitdocs: &[BitdocSchema]) -> String {
    let body = if bitdocs.is_empty() {
        "<p>No images yet.</p>".to_string()
    } else {
        bitdocs.iter().map(entry_card).collect::<Vec<_>>().join("\n")
    };
    page("Latest images", greeting, &body)
}

pub fn upload_form(greeting: &str, upload_url: &str) -> String {
    let body = format!(
        "<form method=\"post\" action=\"{}\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"file\" accept=\"image/*\"> \
         <button class=\"button\">Upload</button></form>",
        html_escape(upload_url)
    );
    page("Upload an image", greeting, &body)
}

pub fn single_entry(greeting: &str, bitdoc: &BitdocSchema) -> String {
    page("Image", greeting, &entry_card(bitdoc))
}

pub fn login_form(greeting: &str) -> String {
    let body = "<form method=\"post\" action=\"/login\">\
                <label>Nickname <input name=\"nickname\"></label> \
                <label>Password <input type=\"password\" name=\"password\"></label> \
                <button class=\"button\">Log In</button></form>";
    page("Log in", greeting, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_escapes_nickname() {
        let html = greeting(Some("<b>eve</b>"));
        assert!(html.contains("&lt;b&gt;eve&lt;/b&gt;"));
        assert!(greeting(None).contains("/login"));
    }

    #[test]
    fn index_lists_entries() {
        let bitdoc = BitdocSchema::new("alice", "http://img/1", Some("cat<1>".into())).unwrap();
        let html = index("", std::slice::from_ref(&bitdoc));
        assert!(html.contains(bitdoc.key.as_str()));
        assert!(html.contains("cat&lt;1&gt;"));
        assert!(html.contains("Processing..."));
        assert!(index("", &[]).contains("No images yet."));
    }
}
