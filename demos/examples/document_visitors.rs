// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two visitors over a small document model.
//!
//! This example shows how to:
//! - declare a class hierarchy (`Block` → `Heading`, `Block` → `Paragraph` → `Quote`),
//! - declare interfaces with a super-interface (`dyn Linked` extends `dyn Inline`),
//! - render with a side-effecting visitor and count words with a value-producing one,
//! - let unhandled values reach the visitor's fallback.
//!
//! Run:
//! - `RUST_LOG=understory_dispatch=trace cargo run -p understory_demos --example document_visitors`

use tracing_subscriber::EnvFilter;
use understory_dispatch::{
    Class, ClassDecl, DispatchError, Dispatcher, Interface, InterfaceDecl, Object, Shape,
    Signatures, Visitor,
};

trait Inline {
    fn text(&self) -> &str;
}
impl Interface for dyn Inline {}

trait Linked: Inline {
    fn href(&self) -> &str;
}
impl Interface for dyn Linked {
    fn declare(interface: &mut InterfaceDecl<Self>) {
        interface.extends::<dyn Inline>(|l| l);
    }
}

struct Block {
    id: u32,
}
impl Class for Block {}

struct Heading {
    block: Block,
    level: u8,
    title: String,
}
impl Class for Heading {
    fn declare(class: &mut ClassDecl<Self>) {
        class.extends::<Block>(|h| &h.block);
    }
}

struct Paragraph {
    block: Block,
    body: String,
}
impl Class for Paragraph {
    fn declare(class: &mut ClassDecl<Self>) {
        class.extends::<Block>(|p| &p.block);
    }
}

struct Quote {
    paragraph: Paragraph,
    author: String,
}
impl Class for Quote {
    fn declare(class: &mut ClassDecl<Self>) {
        class.extends::<Paragraph>(|q| &q.paragraph);
    }
}

struct Emphasis {
    text: String,
}
impl Inline for Emphasis {
    fn text(&self) -> &str {
        &self.text
    }
}
impl Class for Emphasis {
    fn declare(class: &mut ClassDecl<Self>) {
        class.implements::<dyn Inline>(|e| e);
    }
}

struct Hyperlink {
    label: String,
    href: String,
}
impl Inline for Hyperlink {
    fn text(&self) -> &str {
        &self.label
    }
}
impl Linked for Hyperlink {
    fn href(&self) -> &str {
        &self.href
    }
}
impl Class for Hyperlink {
    fn declare(class: &mut ClassDecl<Self>) {
        class.implements::<dyn Linked>(|h| h);
    }
}

#[derive(Default)]
struct HtmlRenderer {
    out: Vec<String>,
}

impl Visitor for HtmlRenderer {
    fn signatures(signatures: &mut Signatures<Self>) {
        signatures
            .dispatch::<Heading>(|r, h| {
                r.out.push(format!("<h{0}>{1}</h{0}>", h.level, h.title));
            })
            .dispatch::<Paragraph>(|r, p| {
                r.out.push(format!("<p id=\"b{}\">{}</p>", p.block.id, p.body));
            })
            .dispatch::<Block>(|r, b| r.out.push(format!("<div id=\"b{}\"></div>", b.id)))
            .dispatch_interface::<dyn Linked>(|r, l| {
                r.out.push(format!("<a href=\"{}\">{}</a>", l.href(), l.text()));
            })
            .dispatch_interface::<dyn Inline>(|r, i| r.out.push(format!("<em>{}</em>", i.text())));
    }

    fn fallback(&mut self, target: &dyn Object, _shape: Shape) {
        self.out.push(format!("<!-- no renderer for {} -->", target.type_key()));
    }
}

struct WordCounter;

impl Visitor for WordCounter {
    fn signatures(signatures: &mut Signatures<Self>) {
        signatures
            .handle::<Heading, usize>(|_, h| h.title.split_whitespace().count())
            .handle::<Quote, usize>(|_, q| {
                q.paragraph.body.split_whitespace().count() + q.author.split_whitespace().count()
            })
            .handle::<Paragraph, usize>(|_, p| p.body.split_whitespace().count())
            .handle_interface::<dyn Inline, usize>(|_, i| i.text().split_whitespace().count());
    }
}

fn main() -> Result<(), DispatchError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dispatcher = Dispatcher::new();
    dispatcher.prepare::<HtmlRenderer>()?;
    dispatcher.prepare::<WordCounter>()?;

    let document: Vec<Box<dyn Object>> = vec![
        Box::new(Heading {
            block: Block { id: 1 },
            level: 1,
            title: String::from("Runtime dispatch"),
        }),
        Box::new(Paragraph {
            block: Block { id: 2 },
            body: String::from("Handlers are chosen by runtime type."),
        }),
        Box::new(Quote {
            paragraph: Paragraph {
                block: Block { id: 3 },
                body: String::from("Simple things should be simple."),
            },
            author: String::from("Alan Kay"),
        }),
        Box::new(Block { id: 4 }),
        Box::new(Emphasis {
            text: String::from("nearest ancestor wins"),
        }),
        Box::new(Hyperlink {
            label: String::from("read more"),
            href: String::from("https://example.com"),
        }),
        Box::new(42_u32),
    ];

    let mut renderer = HtmlRenderer::default();
    let mut words = 0;
    for node in &document {
        let node: &dyn Object = node.as_ref();
        dispatcher.dispatch(&mut renderer, node)?;
        if let Some(count) = dispatcher.handle::<_, usize>(&mut WordCounter, node)? {
            words += count;
        }
    }

    println!("== HTML ==");
    for line in &renderer.out {
        println!("{line}");
    }
    println!("\n== Words: {words} ==");
    tracing::info!(
        resolutions = dispatcher.cached_resolutions(),
        "document visited"
    );
    Ok(())
}
