//! Markdown to [`Page`] renderer. Produces the styled lines the pager draws
//! and the element tree (headings, anchors, config marker) that page
//! enhancements read.

use std::collections::HashMap;

use pulldown_cmark::{
    Alignment, CodeBlockKind, Event as MdEvent, HeadingLevel, Options, Parser as MdParser, Tag,
    TagEnd,
};
use ratatui::prelude::{Color, Modifier, Style};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::page::{
    heading_level_class, BlockId, BlockLayout, Element, HtmlTag, Node, Page, RenderedLine,
    StyledSegment, BLOCK_ID_PREFIX, CONFIG_ELEMENT_ID, CONTENT_ROOT_CLASS, HEADING_ANCHOR_CLASS,
    HEADING_CLASS, HEADING_TITLE_CLASS, PAGE_CLASS,
};

/// Cover banner: title, rule, blank.
const COVER_ROWS: usize = 3;
const PAGE_PADDING_ROWS: usize = 1;
const PAGE_BLOCK: BlockId = BlockId(0);

#[derive(Default)]
struct TableState {
    in_head: bool,
    in_row: bool,
    in_cell: bool,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    current_row: Vec<String>,
    current_cell: String,
    alignments: Vec<Alignment>,
}

impl TableState {
    fn new(alignments: Vec<Alignment>) -> Self {
        Self {
            alignments,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct InlineState {
    emphasis: usize,
    strong: usize,
    strikethrough: usize,
    marked: usize,
    link_depth: usize,
}

impl InlineState {
    fn style(&self) -> Style {
        let mut style = Style::default();
        if self.emphasis > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strong > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.strikethrough > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        if self.marked > 0 {
            style = style.bg(Color::Rgb(90, 80, 20));
        }
        if self.link_depth > 0 {
            style = style.fg(Color::Cyan).add_modifier(Modifier::UNDERLINED);
        }
        style
    }
}

#[derive(Clone, Debug)]
struct ListState {
    ordered: bool,
    next_index: u64,
}

/// Heading being assembled: the inline element stack, bottom is the title span.
struct HeadingBuild {
    level: u8,
    explicit_id: Option<String>,
    line: usize,
    stack: Vec<Element>,
}

impl HeadingBuild {
    fn push_node(&mut self, node: Node) {
        if let Some(top) = self.stack.last_mut() {
            top.push(node);
        }
    }

    fn open(&mut self, el: Element) {
        self.stack.push(el);
    }

    fn close(&mut self, tag: &str) {
        let Some(pos) = self.stack.iter().rposition(|el| el.tag == tag) else {
            return;
        };
        if pos == 0 {
            return;
        }
        while self.stack.len() > pos {
            let Some(el) = self.stack.pop() else { break };
            self.push_node(Node::Element(el));
        }
    }

    fn finish(mut self) -> (u8, Option<String>, usize, Element) {
        while self.stack.len() > 1 {
            let Some(el) = self.stack.pop() else { break };
            self.push_node(Node::Element(el));
        }
        let title = self.stack.pop().unwrap_or_default();
        (self.level, self.explicit_id, self.line, title)
    }
}

/// Top-level block currently open, with the line it started on.
struct OpenBlock {
    tag: &'static str,
    start_line: usize,
}

struct Renderer<'a> {
    syntax_set: &'a SyntaxSet,
    theme: &'a Theme,

    lines: Vec<RenderedLine>,
    blocks: Vec<BlockLayout>,
    content: Element,

    inline: InlineState,
    current_segments: Vec<StyledSegment>,
    current_plain: String,

    block_depth: usize,
    open_block: Option<OpenBlock>,
    heading: Option<HeadingBuild>,
    slugs: HashMap<String, usize>,

    image_alt: Option<String>,
    blockquote_depth: usize,
    list_stack: Vec<ListState>,

    code_block_lang: Option<String>,
    code_block_buf: String,
    html_block_buf: Option<String>,

    table: Option<TableState>,
}

impl<'a> Renderer<'a> {
    fn new(syntax_set: &'a SyntaxSet, theme: &'a Theme, title: &str) -> Self {
        let mut renderer = Self {
            syntax_set,
            theme,
            lines: Vec::new(),
            blocks: vec![BlockLayout::default()],
            content: Element::new("div").with_class(CONTENT_ROOT_CLASS),
            inline: InlineState::default(),
            current_segments: Vec::new(),
            current_plain: String::new(),
            block_depth: 0,
            open_block: None,
            heading: None,
            slugs: HashMap::new(),
            image_alt: None,
            blockquote_depth: 0,
            list_stack: Vec::new(),
            code_block_lang: None,
            code_block_buf: String::new(),
            html_block_buf: None,
            table: None,
        };
        renderer.render_cover(title);
        renderer
    }

    fn render_cover(&mut self, title: &str) {
        self.push_text(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
        self.flush_line(true);
        self.push_text(
            &"━".repeat(title.chars().count().clamp(8, 64)),
            Style::default().fg(Color::DarkGray),
        );
        self.flush_line(true);
        self.flush_line(true);
        for _ in 0..PAGE_PADDING_ROWS {
            self.flush_line(true);
        }
    }

    fn finish(mut self, title: &str) -> Page {
        self.flush_line(false);
        let content_start = COVER_ROWS + PAGE_PADDING_ROWS;
        if self.lines.len() <= content_start {
            self.lines.push(RenderedLine::default());
        }
        self.blocks[PAGE_BLOCK.0] = BlockLayout {
            top_line: COVER_ROWS,
            height: self.lines.len().saturating_sub(COVER_ROWS),
        };

        let page = Element::new("div")
            .with_class(PAGE_CLASS)
            .with_block(PAGE_BLOCK)
            .with_child(self.content);
        Page {
            title: title.to_string(),
            root: Element::new("body").with_child(page),
            lines: self.lines,
            blocks: self.blocks,
            cover_rows: COVER_ROWS,
            padding_rows: PAGE_PADDING_ROWS,
        }
    }

    fn next_block_id(&mut self, layout: BlockLayout) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(layout);
        id
    }

    fn enter_block(&mut self, tag: &'static str) {
        if self.block_depth == 0 {
            self.flush_line(false);
            self.open_block = Some(OpenBlock {
                tag,
                start_line: self.lines.len(),
            });
        }
        self.block_depth = self.block_depth.saturating_add(1);
    }

    fn leave_block(&mut self) {
        self.block_depth = self.block_depth.saturating_sub(1);
        if self.block_depth > 0 {
            return;
        }
        let Some(open) = self.open_block.take() else {
            return;
        };
        let end = self.lines.len();
        let text = self.lines[open.start_line.min(end)..end]
            .iter()
            .map(|line| line.plain.as_str())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let id = self.next_block_id(BlockLayout {
            top_line: open.start_line,
            height: end.saturating_sub(open.start_line).max(1),
        });
        self.content
            .push(Element::new(open.tag).with_block(id).with_text(text));
    }

    fn push_text(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        self.current_plain.push_str(text);
        self.current_segments.push(StyledSegment {
            text: text.to_string(),
            style,
        });
    }

    fn push_styled_plain_text(&mut self, text: &str) {
        let style = if let Some(heading) = &self.heading {
            let base = match heading.level {
                1 => Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
                2 => Style::default()
                    .fg(Color::LightMagenta)
                    .add_modifier(Modifier::BOLD),
                _ => Style::default()
                    .fg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD),
            };
            base.patch(self.inline.style())
        } else {
            self.inline.style()
        };
        self.push_text(text, style);
    }

    fn push_prefix_if_needed(&mut self) {
        if !self.current_plain.is_empty() {
            return;
        }

        if self.blockquote_depth > 0 {
            let prefix = "> ".repeat(self.blockquote_depth);
            self.push_text(&prefix, Style::default().fg(Color::DarkGray));
        }
    }

    fn flush_line(&mut self, force_empty: bool) {
        if !force_empty && self.current_segments.is_empty() && self.current_plain.is_empty() {
            return;
        }

        let line = RenderedLine {
            segments: std::mem::take(&mut self.current_segments),
            plain: std::mem::take(&mut self.current_plain),
        };
        self.lines.push(line);
    }

    fn blank_line(&mut self) {
        if self.lines.last().is_some_and(|line| line.plain.is_empty()) {
            return;
        }
        self.flush_line(true);
    }

    fn heading_level_u8(level: HeadingLevel) -> u8 {
        match level {
            HeadingLevel::H1 => 1,
            HeadingLevel::H2 => 2,
            HeadingLevel::H3 => 3,
            HeadingLevel::H4 => 4,
            HeadingLevel::H5 => 5,
            HeadingLevel::H6 => 6,
        }
    }

    fn handle_start(&mut self, tag: Tag<'_>) {
        if let Some(table) = self.table.as_mut() {
            match tag {
                Tag::TableHead => {
                    table.in_head = true;
                    return;
                }
                Tag::TableRow => {
                    table.in_row = true;
                    table.current_row.clear();
                    return;
                }
                Tag::TableCell => {
                    table.in_cell = true;
                    table.current_cell.clear();
                    return;
                }
                _ => {}
            }
        }

        match tag {
            Tag::Paragraph => self.enter_block("p"),
            Tag::Heading { level, id, .. } => {
                self.flush_line(false);
                self.heading = Some(HeadingBuild {
                    level: Self::heading_level_u8(level),
                    explicit_id: id.map(|id| id.to_string()),
                    line: self.lines.len(),
                    stack: vec![Element::new("span").with_class(HEADING_TITLE_CLASS)],
                });
            }
            Tag::BlockQuote(_) => {
                self.enter_block("blockquote");
                self.flush_line(false);
                self.blockquote_depth = self.blockquote_depth.saturating_add(1);
            }
            Tag::CodeBlock(kind) => {
                self.enter_block("pre");
                self.flush_line(false);
                let lang = match kind {
                    CodeBlockKind::Fenced(name) => name.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code_block_lang = Some(lang);
                self.code_block_buf.clear();
            }
            Tag::HtmlBlock => {
                self.flush_line(false);
                self.html_block_buf = Some(String::new());
            }
            Tag::List(start) => {
                self.enter_block(if start.is_some() { "ol" } else { "ul" });
                let list = if let Some(index) = start {
                    ListState {
                        ordered: true,
                        next_index: index,
                    }
                } else {
                    ListState {
                        ordered: false,
                        next_index: 1,
                    }
                };
                self.list_stack.push(list);
            }
            Tag::Item => {
                self.flush_line(false);
                let depth = self.list_stack.len().saturating_sub(1);
                let indent = "  ".repeat(depth);

                let bullet = if let Some(last) = self.list_stack.last_mut() {
                    if last.ordered {
                        let bullet = format!("{}. ", last.next_index);
                        last.next_index = last.next_index.saturating_add(1);
                        bullet
                    } else {
                        "- ".to_string()
                    }
                } else {
                    "- ".to_string()
                };

                self.push_text(
                    &format!("{indent}{bullet}"),
                    Style::default().fg(Color::DarkGray),
                );
            }
            Tag::Emphasis => {
                self.inline.emphasis = self.inline.emphasis.saturating_add(1);
                self.open_heading_inline("em");
            }
            Tag::Strong => {
                self.inline.strong = self.inline.strong.saturating_add(1);
                self.open_heading_inline("strong");
            }
            Tag::Strikethrough => {
                self.inline.strikethrough = self.inline.strikethrough.saturating_add(1);
                self.open_heading_inline("del");
            }
            Tag::Link { dest_url, .. } => {
                self.inline.link_depth = self.inline.link_depth.saturating_add(1);
                if let Some(heading) = self.heading.as_mut() {
                    heading.open(Element::new("a").with_attr("href", dest_url.to_string()));
                }
            }
            Tag::Image { .. } => {
                self.image_alt = Some(String::new());
            }
            Tag::Table(alignments) => {
                self.enter_block("table");
                self.flush_line(false);
                self.table = Some(TableState::new(alignments));
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, tag: TagEnd) {
        if let Some(table) = self.table.as_mut() {
            match tag {
                TagEnd::TableCell => {
                    if table.in_cell {
                        table
                            .current_row
                            .push(table.current_cell.trim().to_string());
                        table.current_cell.clear();
                        table.in_cell = false;
                    }
                    return;
                }
                TagEnd::TableRow => {
                    if table.in_row {
                        if table.in_head {
                            table.headers = table.current_row.clone();
                        } else {
                            table.rows.push(table.current_row.clone());
                        }
                        table.current_row.clear();
                        table.in_row = false;
                    }
                    return;
                }
                TagEnd::TableHead => {
                    if table.in_row {
                        table.headers = std::mem::take(&mut table.current_row);
                        table.in_row = false;
                    }
                    table.in_head = false;
                    return;
                }
                TagEnd::Table => {
                    let table_state = self.table.take().unwrap_or_default();
                    self.render_table(&table_state);
                    self.leave_block();
                    self.blank_line();
                    return;
                }
                _ => {}
            }
        }

        match tag {
            TagEnd::Paragraph => {
                self.flush_line(false);
                self.leave_block();
                self.blank_line();
            }
            TagEnd::Heading(_) => {
                self.flush_line(false);
                if let Some(heading) = self.heading.take() {
                    self.finish_heading(heading);
                }
                self.blank_line();
            }
            TagEnd::BlockQuote => {
                self.flush_line(false);
                self.blockquote_depth = self.blockquote_depth.saturating_sub(1);
                self.leave_block();
                self.blank_line();
            }
            TagEnd::CodeBlock => {
                let lang = self.code_block_lang.take().unwrap_or_default();
                let code = std::mem::take(&mut self.code_block_buf);
                self.render_code_block(&lang, &code);
                self.leave_block();
                self.blank_line();
            }
            TagEnd::HtmlBlock => {
                let raw = self.html_block_buf.take().unwrap_or_default();
                self.finish_html_block(&raw);
            }
            TagEnd::List(_) => {
                self.flush_line(false);
                self.list_stack.pop();
                self.leave_block();
                self.blank_line();
            }
            TagEnd::Item => {
                self.flush_line(false);
            }
            TagEnd::Emphasis => {
                self.inline.emphasis = self.inline.emphasis.saturating_sub(1);
                self.close_heading_inline("em");
            }
            TagEnd::Strong => {
                self.inline.strong = self.inline.strong.saturating_sub(1);
                self.close_heading_inline("strong");
            }
            TagEnd::Strikethrough => {
                self.inline.strikethrough = self.inline.strikethrough.saturating_sub(1);
                self.close_heading_inline("del");
            }
            TagEnd::Link => {
                self.inline.link_depth = self.inline.link_depth.saturating_sub(1);
                self.close_heading_inline("a");
            }
            TagEnd::Image => {
                if let Some(alt) = self.image_alt.take() {
                    let alt = if alt.trim().is_empty() {
                        "image".to_string()
                    } else {
                        alt.trim().to_string()
                    };
                    self.push_prefix_if_needed();
                    self.push_text(&format!("[image: {alt}]"), Style::default().fg(Color::LightBlue));
                }
            }
            _ => {}
        }
    }

    fn open_heading_inline(&mut self, tag: &str) {
        if let Some(heading) = self.heading.as_mut() {
            heading.open(Element::new(tag));
        }
    }

    fn close_heading_inline(&mut self, tag: &str) {
        if let Some(heading) = self.heading.as_mut() {
            heading.close(tag);
        }
    }

    fn finish_heading(&mut self, heading: HeadingBuild) {
        let (level, explicit_id, line, title) = heading.finish();
        let slug = self.unique_slug(explicit_id.as_deref(), &title.text_content());
        let end = self.lines.len();
        let block = self.next_block_id(BlockLayout {
            top_line: line,
            height: end.saturating_sub(line).max(1),
        });

        let mut el = Element::new("div")
            .with_class(HEADING_CLASS)
            .with_class(&heading_level_class(level))
            .with_block(block);
        if !slug.is_empty() {
            el.set_attr("id", format!("{BLOCK_ID_PREFIX}{slug}"));
            el.set_attr("data-id", slug.clone());
            el.push(
                Element::new("a")
                    .with_class(HEADING_ANCHOR_CLASS)
                    .with_attr("id", slug),
            );
        }
        el.push(title);
        self.content.push(el);
    }

    fn unique_slug(&mut self, explicit: Option<&str>, title: &str) -> String {
        if let Some(explicit) = explicit.filter(|id| !id.is_empty()) {
            *self.slugs.entry(explicit.to_string()).or_insert(0) += 1;
            return explicit.to_string();
        }
        let base = slugify(title);
        if base.is_empty() {
            return base;
        }
        let seen = self.slugs.entry(base.clone()).or_insert(0);
        let slug = if *seen == 0 {
            base.clone()
        } else {
            format!("{base}-{seen}")
        };
        *seen += 1;
        slug
    }

    fn finish_html_block(&mut self, raw: &str) {
        if let Some(tag) = HtmlTag::parse(raw) {
            if tag.attrs.iter().any(|(k, v)| k == "id" && v == CONFIG_ELEMENT_ID) {
                self.content.push(tag.to_element());
                return;
            }
        }

        self.enter_block("div");
        for line in raw.lines() {
            self.push_prefix_if_needed();
            self.push_text(line, Style::default().fg(Color::DarkGray));
            self.flush_line(false);
        }
        self.leave_block();
        self.blank_line();
    }

    fn add_inline_html(&mut self, raw: &str) {
        let Some(tag) = HtmlTag::parse(raw) else {
            return;
        };
        if tag.name == "mark" {
            if tag.closing {
                self.inline.marked = self.inline.marked.saturating_sub(1);
            } else if !tag.self_closing {
                self.inline.marked = self.inline.marked.saturating_add(1);
            }
        }

        let Some(heading) = self.heading.as_mut() else {
            return;
        };
        if tag.closing {
            heading.close(&tag.name);
        } else if tag.self_closing || tag.is_void() {
            heading.push_node(Node::Element(tag.to_element()));
        } else {
            heading.open(tag.to_element());
        }
    }

    fn add_text(&mut self, text: &str) {
        if let Some(buf) = self.html_block_buf.as_mut() {
            buf.push_str(text);
            return;
        }

        if self.code_block_lang.is_some() {
            self.code_block_buf.push_str(text);
            return;
        }

        if let Some(table) = self.table.as_mut() {
            if table.in_cell {
                table.current_cell.push_str(text);
                return;
            }
        }

        if let Some(alt) = self.image_alt.as_mut() {
            alt.push_str(text);
            return;
        }

        if let Some(heading) = self.heading.as_mut() {
            heading.push_node(Node::text(text));
        }
        self.push_prefix_if_needed();
        self.push_styled_plain_text(text);
    }

    fn soft_break(&mut self) {
        if self.code_block_lang.is_some() {
            self.code_block_buf.push('\n');
            return;
        }
        if let Some(table) = self.table.as_mut() {
            if table.in_cell {
                table.current_cell.push(' ');
                return;
            }
        }
        if let Some(heading) = self.heading.as_mut() {
            heading.push_node(Node::text(" "));
        }

        self.push_text(" ", self.inline.style());
    }

    fn hard_break(&mut self) {
        if self.code_block_lang.is_some() {
            self.code_block_buf.push('\n');
            return;
        }
        self.flush_line(false);
    }

    fn add_inline_code(&mut self, code: &str) {
        if self.code_block_lang.is_some() {
            self.code_block_buf.push_str(code);
            return;
        }
        if let Some(table) = self.table.as_mut() {
            if table.in_cell {
                table.current_cell.push_str(code);
                return;
            }
        }
        if let Some(heading) = self.heading.as_mut() {
            heading.push_node(Element::new("code").with_text(code).into());
        }
        self.push_prefix_if_needed();
        let style = Style::default()
            .fg(Color::LightYellow)
            .add_modifier(Modifier::BOLD);
        self.push_text(code, style);
    }

    fn add_rule(&mut self) {
        self.enter_block("hr");
        self.push_text(
            "────────────────────────────────────────────────────────────────",
            Style::default().fg(Color::DarkGray),
        );
        self.flush_line(false);
        self.leave_block();
        self.blank_line();
    }

    fn add_task_marker(&mut self, done: bool) {
        self.push_prefix_if_needed();
        let marker = if done { "[x] " } else { "[ ] " };
        self.push_text(marker, Style::default().fg(Color::DarkGray));
    }

    fn render_code_block(&mut self, lang: &str, code: &str) {
        let syntax = if lang.trim().is_empty() {
            self.syntax_set.find_syntax_plain_text()
        } else {
            self.syntax_set
                .find_syntax_by_token(lang)
                .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
        };

        let mut highlighter = HighlightLines::new(syntax, self.theme);

        for line in LinesWithEndings::from(code) {
            let clean = line.trim_end_matches(['\n', '\r']);

            self.push_text("  ", Style::default().fg(Color::DarkGray));

            let highlighted_tokens = highlighter
                .highlight_line(line, self.syntax_set)
                .unwrap_or_default();

            if highlighted_tokens.is_empty() {
                self.push_text(clean, Style::default().fg(Color::LightGreen));
            } else {
                for (syn_style, token) in highlighted_tokens {
                    let style = Style::default()
                        .fg(Color::Rgb(
                            syn_style.foreground.r,
                            syn_style.foreground.g,
                            syn_style.foreground.b,
                        ))
                        .bg(Color::Rgb(
                            syn_style.background.r,
                            syn_style.background.g,
                            syn_style.background.b,
                        ));
                    let token = token.replace(['\n', '\r'], "");
                    self.push_text(&token, style);
                }
            }

            self.flush_line(true);
        }
    }

    fn render_table(&mut self, table: &TableState) {
        let mut rows: Vec<Vec<String>> = Vec::new();
        if !table.headers.is_empty() {
            rows.push(table.headers.clone());
        }
        rows.extend(table.rows.clone());

        let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        if col_count == 0 {
            return;
        }

        for row in &mut rows {
            row.resize(col_count, String::new());
        }

        let mut widths = vec![3usize; col_count];
        for row in &rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        if let Some(header) = rows.first() {
            let line = format_table_row(header, &widths);
            self.push_text(&line, Style::default().fg(Color::Yellow));
            self.flush_line(false);

            let sep_cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(idx, width)| {
                    let align = table
                        .alignments
                        .get(idx)
                        .copied()
                        .unwrap_or(Alignment::None);
                    match align {
                        Alignment::Left => format!(":{}", "-".repeat(width.saturating_sub(1))),
                        Alignment::Center if *width <= 1 => ":".to_string(),
                        Alignment::Center => {
                            format!(":{}:", "-".repeat(width.saturating_sub(2)))
                        }
                        Alignment::Right => format!("{}:", "-".repeat(width.saturating_sub(1))),
                        Alignment::None => "-".repeat(*width),
                    }
                })
                .collect();
            let sep_line = format_table_row(&sep_cells, &widths);
            self.push_text(&sep_line, Style::default().fg(Color::DarkGray));
            self.flush_line(false);

            for row in rows.iter().skip(1) {
                let row_line = format_table_row(row, &widths);
                self.push_text(&row_line, Style::default());
                self.flush_line(false);
            }
        }
    }
}

fn format_table_row(row: &[String], widths: &[usize]) -> String {
    let mut output = String::from("| ");
    for (idx, cell) in row.iter().enumerate() {
        let width = widths[idx];
        output.push_str(&format!("{cell:<width$}"));
        output.push_str(" | ");
    }
    output
}

/// Lowercase alphanumerics, everything else collapsed into single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    slug
}

pub fn load_highlighting() -> (SyntaxSet, Theme) {
    let syntax_set = SyntaxSet::load_defaults_newlines();
    let theme_set = ThemeSet::load_defaults();
    let theme = resolve_theme(&theme_set);
    (syntax_set, theme)
}

fn resolve_theme(theme_set: &ThemeSet) -> Theme {
    if let Some(theme) = theme_set.themes.get("base16-ocean.dark") {
        return theme.clone();
    }
    theme_set
        .themes
        .values()
        .next()
        .cloned()
        .unwrap_or_default()
}

pub fn render_markdown(source: &str, title: &str, syntax_set: &SyntaxSet, theme: &Theme) -> Page {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

    let parser = MdParser::new_ext(source, options);
    let mut renderer = Renderer::new(syntax_set, theme, title);

    for event in parser {
        match event {
            MdEvent::Start(tag) => renderer.handle_start(tag),
            MdEvent::End(tag) => renderer.handle_end(tag),
            MdEvent::Text(text) => renderer.add_text(&text),
            MdEvent::Code(code) => renderer.add_inline_code(&code),
            MdEvent::Html(html) => renderer.add_text(&html),
            MdEvent::InlineHtml(html) => renderer.add_inline_html(&html),
            MdEvent::FootnoteReference(name) => renderer.add_text(&format!("[^{name}]")),
            MdEvent::SoftBreak => renderer.soft_break(),
            MdEvent::HardBreak => renderer.hard_break(),
            MdEvent::Rule => renderer.add_rule(),
            MdEvent::TaskListMarker(done) => renderer.add_task_marker(done),
            _ => {}
        }
    }

    renderer.finish(title)
}

pub fn plain_render(page: &Page) -> String {
    page.lines
        .iter()
        .map(|line| line.plain.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
