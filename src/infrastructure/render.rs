//! Minimal HTML rendering for the contact form, room pages and comment fragments.
//!
//! Markup is deliberately plain; sites are expected to restyle it. The parts
//! the client controller relies on are the `comment-list` container id, the
//! `comment-input` textarea and the `datetime` attribute on every `<time>`.

use crate::application::pipeline::{FormContext, RoomContext};
use crate::domain::comment::CommentPage;
use crate::domain::flash::FlashMessage;
use crate::domain::validation::{escape_markup, RawForm, ValidationErrorMap};

/// Id of the container a comment fragment replaces.
pub const COMMENT_LIST_ID: &str = "comment-list";

/// Id of the comment input the client resets after a swap.
pub const COMMENT_INPUT_ID: &str = "comment-input";

const CONTACT_FIELDS: [(&str, &str); 4] = [
    ("name", "Name"),
    ("email", "Email"),
    ("subject", "Subject"),
    ("message", "Message"),
];

const PAGE_END: &str = "</main>\n</body></html>\n";

fn page_start(title: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><title>{}</title></head><body>\n<main>\n",
        escape_markup(title)
    )
}

fn csrf_input(token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"_csrf\" value=\"{}\">\n",
        escape_markup(token)
    )
}

/// Render the contact page.
///
/// `values` and `errors` are empty on a fresh render and carry the rejected
/// submission on a re-render.
pub fn contact_page(context: &FormContext, values: &RawForm, errors: &ValidationErrorMap) -> String {
    let mut html = page_start("Contact");
    html.push_str(&flashes(&context.flashes));

    html.push_str("<form method=\"post\" action=\"/contact\">\n");
    html.push_str(&csrf_input(&context.csrf_token));
    for (field, label) in CONTACT_FIELDS {
        let value = escape_markup(values.get(field));
        html.push_str(&format!("<label for=\"{field}\">{label}</label>\n"));
        html.push_str(&if field == "message" {
            format!("<textarea id=\"{field}\" name=\"{field}\">{value}</textarea>\n")
        } else {
            format!("<input id=\"{field}\" name=\"{field}\" value=\"{value}\">\n")
        });
        if let Some(message) = errors.get(field) {
            html.push_str(&format!(
                "<p class=\"field-error\" data-field=\"{field}\">{}</p>\n",
                escape_markup(message)
            ));
        }
    }
    html.push_str("<button type=\"submit\">Send</button>\n</form>\n");
    html.push_str(PAGE_END);
    html
}

/// Render a full room page: the live comment list and the comment form.
///
/// The form posts as a partial update and swaps the returned fragment into
/// the list; the token travels in the `x-csrf-token` header as well.
pub fn room_page(room: &str, context: &RoomContext) -> String {
    let escaped_room = escape_markup(room);
    let token = escape_markup(&context.csrf_token);

    let mut html = page_start(room);
    html.push_str(&format!("<meta name=\"csrf-token\" content=\"{token}\">\n"));
    html.push_str(&format!("<h1>{escaped_room}</h1>\n"));
    html.push_str(&comment_fragment(room, &context.page));
    html.push_str(&format!(
        "<form method=\"post\" action=\"/chat/{escaped_room}/post-comment\" \
         hx-post=\"/chat/{escaped_room}/post-comment\" \
         hx-target=\"#{COMMENT_LIST_ID}\" hx-swap=\"outerHTML\" \
         hx-headers='{{\"x-csrf-token\": \"{token}\"}}'>\n"
    ));
    html.push_str(&csrf_input(&context.csrf_token));
    html.push_str(&format!(
        "<textarea id=\"{COMMENT_INPUT_ID}\" name=\"message\" maxlength=\"500\"></textarea>\n"
    ));
    html.push_str("<button type=\"submit\">Post</button>\n</form>\n");
    html.push_str(PAGE_END);
    html
}

/// Render one page of comments as a swappable fragment.
pub fn comment_fragment(room: &str, page: &CommentPage) -> String {
    let room = escape_markup(room);
    let mut html = format!(
        "<div id=\"{COMMENT_LIST_ID}\" data-page=\"{}\" data-total-pages=\"{}\">\n<ul>\n",
        page.current_page, page.total_pages
    );
    for comment in &page.comments {
        let author = comment
            .author
            .as_deref()
            .map(escape_markup)
            .unwrap_or_else(|| "Anonymous".to_string());
        let datetime = comment.datetime_attr();
        html.push_str(&format!(
            "<li class=\"comment\"><span class=\"author\">{author}</span> \
             <time datetime=\"{datetime}\">{datetime}</time><p>{}</p></li>\n",
            comment.body
        ));
    }
    html.push_str("</ul>\n");

    if page.current_page > 1 {
        html.push_str(&format!(
            "<a class=\"prev\" href=\"/chat/{room}/comments?page={}\">Newer</a>\n",
            page.current_page - 1
        ));
    }
    if page.current_page < page.total_pages {
        html.push_str(&format!(
            "<a class=\"next\" href=\"/chat/{room}/comments?page={}\">Older</a>\n",
            page.current_page + 1
        ));
    }
    html.push_str("</div>\n");
    html
}

fn flashes(messages: &[FlashMessage]) -> String {
    messages
        .iter()
        .map(|message| {
            format!(
                "<div class=\"flash flash-{}\">{}</div>\n",
                message.category,
                escape_markup(&message.text)
            )
        })
        .collect()
}
