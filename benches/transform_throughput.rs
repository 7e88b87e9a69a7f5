//! Compile and apply throughput benchmarks
//!
//! Measures stylesheet compilation and a full apply + serialize cycle over source
//! documents of 10, 100 and 1000 records.
//!
//! Run benchmarks: `cargo bench --bench transform_throughput`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use xform::{Parameters, XmlDocument, XsltStylesheet, compile_stylesheet};

const STYLESHEET: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:output method="xml" indent="yes"/>
    <xsl:param name="title" select="'Records'"/>
    <xsl:key name="by-group" match="record" use="@group"/>
    <xsl:template match="/records">
        <table title="{$title}">
            <xsl:apply-templates select="record">
                <xsl:sort select="@value" data-type="number" order="descending"/>
            </xsl:apply-templates>
            <summary groups="{count(record[generate-id() = generate-id(key('by-group', @group)[1])])}"/>
        </table>
    </xsl:template>
    <xsl:template match="record">
        <row id="{@id}">
            <xsl:choose>
                <xsl:when test="@value &gt; 500"><high><xsl:value-of select="name"/></high></xsl:when>
                <xsl:otherwise><low><xsl:value-of select="name"/></low></xsl:otherwise>
            </xsl:choose>
        </row>
    </xsl:template>
</xsl:stylesheet>"#;

/// Generate a source document with `count` records
fn generate_records(count: usize) -> String {
    let mut xml = String::from("<records>");
    for i in 0..count {
        xml.push_str(&format!(
            r#"<record id="r{i}" group="g{}" value="{}"><name>Record {i}</name></record>"#,
            i % 7,
            (i * 37) % 1000
        ));
    }
    xml.push_str("</records>");
    xml
}

fn bench_compile(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    c.bench_function("compile_stylesheet", |b| {
        b.iter(|| compile_stylesheet(black_box(STYLESHEET)).unwrap())
    });
}

fn bench_apply(c: &mut Criterion) {
    let compiled = compile_stylesheet(STYLESHEET).unwrap();
    let params = Parameters::new().literal("title", "Benchmark");
    let mut group = c.benchmark_group("apply_and_serialize");

    for count in [10, 100, 1000] {
        let source = generate_records(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, source| {
            let doc = XmlDocument::parse(source).unwrap();
            let mut sheet = XsltStylesheet::new(compiled.clone());
            sheet.bind_document(doc.root_node());
            b.iter(|| {
                assert!(sheet.apply_with(&params).unwrap());
                black_box(sheet.to_bytes().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_apply);
criterion_main!(benches);
