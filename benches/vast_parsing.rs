//! Benchmarks for ad decision handling
//!
//! Parsing and resolution sit between the decision response and the start
//! of the ad break, so they delay the first ad frame for every viewer.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use preroller::ad::resolver;
use preroller::ad::tracking::RecordingBeaconSink;
use preroller::ad::vast;
use preroller::ad::BeaconSink;
use preroller::player::{MimeTech, PlaybackTech};
use std::sync::Arc;

const RENDITIONS: [(u32, u32, &str); 5] = [
    (640, 360, "video/mp4"),
    (1280, 720, "video/webm"),
    (1920, 1080, "video/mp4"),
    (1280, 720, "application/x-mpegURL"),
    (640, 360, "video/x-flv"),
];

/// VAST document with `ad_count` ads, each offering `media_files` renditions
fn generate_vast(ad_count: usize, media_files: usize, with_companion: bool) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><VAST version="3.0">"#);

    for ad in 0..ad_count {
        xml.push_str(&format!(
            r#"<Ad id="ad-{ad}"><InLine>
              <AdSystem>Bench</AdSystem><AdTitle>Pre-roll {ad}</AdTitle>
              <Impression><![CDATA[https://t.example.com/imp?ad={ad}&cb=[CACHEBUSTING]]]></Impression>
              <Error><![CDATA[https://t.example.com/err?ad={ad}&code=[ERRORCODE]]]></Error>
              <Creatives><Creative id="lin-{ad}"><Linear skipoffset="00:00:05">
                <Duration>00:00:15</Duration>
                <TrackingEvents>
                  <Tracking event="start"><![CDATA[https://t.example.com/start?ad={ad}]]></Tracking>
                  <Tracking event="midpoint"><![CDATA[https://t.example.com/mid?ad={ad}]]></Tracking>
                  <Tracking event="progress" offset="10%"><![CDATA[https://t.example.com/p10?ad={ad}]]></Tracking>
                  <Tracking event="complete"><![CDATA[https://t.example.com/complete?ad={ad}]]></Tracking>
                </TrackingEvents>
                <VideoClicks>
                  <ClickThrough><![CDATA[https://advertiser.example.com/?cb=[CACHEBUSTER]]]></ClickThrough>
                </VideoClicks>
                <MediaFiles>"#
        ));
        for idx in 0..media_files {
            let (w, h, mime) = RENDITIONS[idx % RENDITIONS.len()];
            xml.push_str(&format!(
                r#"<MediaFile delivery="progressive" type="{mime}" width="{w}" height="{h}"><![CDATA[https://cdn.example.com/ad_{ad}_{w}x{h}_{idx}]]></MediaFile>"#
            ));
        }
        xml.push_str("</MediaFiles></Linear></Creative>");
        if with_companion {
            xml.push_str(&format!(
                r#"<Creative id="comp-{ad}"><CompanionAds><Companion id="c-{ad}" width="300" height="250">
                  <StaticResource creativeType="image/png"><![CDATA[https://cdn.example.com/banner_{ad}.png]]></StaticResource>
                  <CompanionClickThrough><![CDATA[https://advertiser.example.com/banner]]></CompanionClickThrough>
                </Companion></CompanionAds></Creative>"#
            ));
        }
        xml.push_str("</Creatives></InLine></Ad>");
    }

    xml.push_str("</VAST>");
    xml
}

fn techs() -> Vec<Arc<dyn PlaybackTech>> {
    vec![Arc::new(MimeTech::hls()), Arc::new(MimeTech::html5())]
}

// ── Benchmarks ──────────────────────────────────────────────────────

fn bench_parse_vast(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_vast");

    for ad_count in [1, 3, 10] {
        let xml = generate_vast(ad_count, 3, true);
        group.bench_with_input(BenchmarkId::new("ads", ad_count), &xml, |b, input| {
            b.iter(|| {
                vast::parse_vast(black_box(input)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_parse_vast_empty(c: &mut Criterion) {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?><VAST version="3.0"></VAST>"#;
    c.bench_function("parse_vast_no_fill", |b| {
        b.iter(|| {
            vast::parse_vast(black_box(xml)).unwrap();
        });
    });
}

/// Technology-major source ordering over growing rendition lists
fn bench_build_sources(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_sources");
    let techs = techs();

    for count in [1, 5, 20] {
        let decision = vast::parse_vast(&generate_vast(1, count, false)).unwrap();
        let media_files = match &decision.ads[0].creatives[0].kind {
            vast::CreativeKind::Linear(linear) => linear.media_files.clone(),
            vast::CreativeKind::Companion(_) => panic!("Expected linear creative"),
        };

        group.bench_with_input(
            BenchmarkId::new("media_files", count),
            &media_files,
            |b, input| {
                b.iter(|| resolver::build_sources(black_box(input), &techs));
            },
        );
    }

    group.finish();
}

/// Decision to ready ad break, as done on every decision response
fn bench_parse_and_resolve(c: &mut Criterion) {
    let xml = generate_vast(3, 5, true);
    let techs = techs();
    let beacons: Arc<dyn BeaconSink> = RecordingBeaconSink::new();

    c.bench_with_input(
        BenchmarkId::new("parse_and_resolve", format!("{}bytes", xml.len())),
        &xml,
        |b, input| {
            b.iter(|| {
                let decision = vast::parse_vast(black_box(input)).unwrap();
                resolver::resolve(&decision, &techs, &beacons)
            });
        },
    );
}

criterion_group!(
    benches,
    bench_parse_vast,
    bench_parse_vast_empty,
    bench_build_sources,
    bench_parse_and_resolve,
);
criterion_main!(benches);
