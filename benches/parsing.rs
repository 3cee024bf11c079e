//! Benchmarks for head scanning, fragment parsing and OpenGraph trees

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use url::Url;
use webpage_embed::{HeadScanner, OgpTree, PageMeta, parse_fragment, parse_json, parse_xml};

const SAMPLE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Sample Video Page</title>
    <base href="https://example.com/videos/">
    <link rel="stylesheet" href="/static/site.css">
    <link rel="alternate" type="application/json+oembed" href="/oembed?url=https%3A%2F%2Fexample.com%2Fv%2F1&format=json">
    <link rel="alternate" type="text/xml+oembed" href="/oembed?url=https%3A%2F%2Fexample.com%2Fv%2F1&format=xml">
    <link rel="canonical" href="1">
    <meta property="og:title" content="Sample Video">
    <meta property="og:type" content="video.other">
    <meta property="og:image" content="https://example.com/thumbs/1_1280x720.jpg">
    <meta property="og:image:width" content="1280">
    <meta property="og:image:height" content="720">
    <meta property="og:video" content="https://example.com/embed/1">
    <meta property="og:video:type" content="text/html">
    <meta property="og:video:width" content="1280">
    <meta property="og:video:height" content="720">
    <script>window.config = {"player": "<iframe>"};</script>
</head>
<body>
    <h1>Sample Video</h1>
</body>
</html>"#;

fn base() -> Url {
    Url::parse("https://example.com/v/1").expect("valid base URL")
}

fn bench_head_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("head_scan");
    group.throughput(Throughput::Bytes(SAMPLE_HEAD.len() as u64));
    let base = base();

    group.bench_function("whole_document", |b| {
        b.iter(|| PageMeta::from_str(black_box(SAMPLE_HEAD), &base))
    });

    // Network reads rarely line up with tag boundaries.
    for chunk_size in [64, 512, 4096] {
        group.bench_with_input(
            BenchmarkId::new("chunked", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut scanner = HeadScanner::new(base.clone());
                    let bytes = SAMPLE_HEAD.as_bytes();
                    for chunk in bytes.chunks(chunk_size) {
                        let text = std::str::from_utf8(chunk).unwrap_or_default();
                        if !scanner.feed(black_box(text)) {
                            break;
                        }
                    }
                    scanner.finish()
                })
            },
        );
    }

    group.finish();
}

fn bench_body_after_head(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_after_head");
    let base = base();

    // The scan stops at the head, so body size should not matter.
    for paragraphs in [10, 1000] {
        let html = generate_page_with_body(paragraphs);
        group.throughput(Throughput::Bytes(html.len() as u64));
        group.bench_with_input(BenchmarkId::new("scan", paragraphs), &html, |b, html| {
            b.iter(|| PageMeta::from_str(black_box(html), &base))
        });
    }

    group.finish();
}

fn bench_fragment_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_parsing");

    let iframe = r#"<iframe width="200" height="113" src="https://www.youtube.com/embed/abc?feature=oembed" frameborder="0" allow="accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture" allowfullscreen title="Clip"></iframe>"#;
    let nested = generate_nested_markup(50);
    let malformed = r#"<div><p>unclosed <b>bold <i>italic</div></span><iframe src="x"><br/><img src=y></p>"#;

    for (name, markup) in [
        ("iframe", iframe.to_string()),
        ("nested", nested),
        ("malformed", malformed.to_string()),
    ] {
        group.throughput(Throughput::Bytes(markup.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", name), &markup, |b, markup| {
            b.iter(|| parse_fragment(black_box(markup)))
        });
        group.bench_with_input(BenchmarkId::new("round_trip", name), &markup, |b, markup| {
            b.iter(|| parse_fragment(black_box(markup)).serialize())
        });
    }

    group.finish();
}

fn bench_opengraph_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("opengraph");

    for images in [1, 10, 100] {
        let properties = generate_image_properties(images);
        group.throughput(Throughput::Elements(properties.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("parse", images),
            &properties,
            |b, properties| {
                b.iter(|| {
                    OgpTree::parse(
                        black_box(properties)
                            .iter()
                            .map(|(p, c)| (p.as_str(), c.as_str())),
                    )
                })
            },
        );
    }

    group.finish();
}

fn bench_oembed_documents(c: &mut Criterion) {
    let mut group = c.benchmark_group("oembed");

    let json = br#"{"type":"video","version":"1.0","title":"Clip","provider_name":"YouTube","thumbnail_url":"https://i.ytimg.com/vi/abc/hqdefault.jpg","thumbnail_width":480,"thumbnail_height":360,"width":200,"height":113,"html":"<iframe width=\"200\" height=\"113\" src=\"https://www.youtube.com/embed/abc\"></iframe>"}"#;
    let xml = br#"<?xml version="1.0" encoding="utf-8"?>
<oembed>
    <type>video</type>
    <version>1.0</version>
    <title>Clip</title>
    <provider_name>Vimeo</provider_name>
    <thumbnail_url>https://i.vimeocdn.com/video/452001751_295x166</thumbnail_url>
    <width>640</width>
    <height>360</height>
    <html>&lt;iframe src="https://player.vimeo.com/video/76979871"&gt;&lt;/iframe&gt;</html>
</oembed>"#;

    group.bench_function("json", |b| b.iter(|| parse_json(black_box(json))));
    group.bench_function("xml", |b| b.iter(|| parse_xml(black_box(xml))));

    group.finish();
}

// Helper functions to generate test input

fn generate_page_with_body(paragraphs: usize) -> String {
    let body: String = (0..paragraphs)
        .map(|i| format!("<p>Paragraph {i} with a <a href=\"/link/{i}\">link</a>.</p>"))
        .collect::<Vec<_>>()
        .join("\n");
    SAMPLE_HEAD.replace("<h1>Sample Video</h1>", &body)
}

fn generate_nested_markup(depth: usize) -> String {
    let mut markup = String::new();
    for i in 0..depth {
        markup.push_str(&format!("<div class=\"level-{i}\">"));
    }
    markup.push_str(r#"<iframe src="https://player.example.com/1"></iframe>"#);
    for _ in 0..depth {
        markup.push_str("</div>");
    }
    markup
}

fn generate_image_properties(count: usize) -> Vec<(String, String)> {
    let mut properties = vec![
        ("og:title".to_string(), "Gallery".to_string()),
        ("og:type".to_string(), "website".to_string()),
    ];
    for i in 0..count {
        properties.push(("og:image".to_string(), format!("https://example.com/{i}.jpg")));
        properties.push(("og:image:width".to_string(), "800".to_string()));
        properties.push(("og:image:height".to_string(), "600".to_string()));
        properties.push(("og:image:alt".to_string(), format!("Image {i}")));
    }
    properties
}

criterion_group!(
    benches,
    bench_head_scan,
    bench_body_after_head,
    bench_fragment_parsing,
    bench_opengraph_tree,
    bench_oembed_documents,
);

criterion_main!(benches);
