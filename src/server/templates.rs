//! HTML pages rendered by the handlers

/// Upload form served at `/`
#[must_use]
pub fn index_page() -> String {
    page(
        "Background Removal",
        r#"<h1>Remove the background from a photo</h1>
    <form action="/process_image" method="post" enctype="multipart/form-data">
      <input type="file" name="image" accept="image/*">
      <button type="submit">Remove background</button>
    </form>"#,
    )
}

/// Result page referencing the composited image
#[must_use]
pub fn result_page(image_url: &str, image_filename: &str) -> String {
    let image_url = escape_html(image_url);
    let image_filename = escape_html(image_filename);
    page(
        "Result",
        &format!(
            r#"<h1>Background removed</h1>
    <img src="{image_url}" alt="{image_filename}">
    <p><a href="{image_url}" download="{image_filename}">Download {image_filename}</a></p>
    <p><a href="/">Process another image</a></p>"#
        ),
    )
}

/// Page shown when the upload form was submitted without a file
#[must_use]
pub fn missing_upload_page() -> String {
    page(
        "No image selected",
        r#"<h1>No image selected</h1>
    <p>Choose an image file before submitting the form.</p>
    <p><a href="/">Back to the upload form</a></p>"#,
    )
}

/// Generic failure page; carries no diagnostic detail
#[must_use]
pub fn server_error_page() -> String {
    page(
        "Processing failed",
        r#"<h1>Something went wrong</h1>
    <p>The image could not be processed.</p>
    <p><a href="/">Back to the upload form</a></p>"#,
    )
}

/// Page shown when the upload exceeds the size limit
#[must_use]
pub fn upload_too_large_page(limit_bytes: usize) -> String {
    page(
        "Upload too large",
        &format!(
            r#"<h1>Upload too large</h1>
    <p>Images must be smaller than {} MiB.</p>
    <p><a href="/">Back to the upload form</a></p>"#,
            limit_bytes.div_ceil(1024 * 1024)
        ),
    )
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>{title}</title>
  </head>
  <body>
    {body}
  </body>
</html>
"#
    )
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
