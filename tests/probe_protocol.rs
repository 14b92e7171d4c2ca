// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! End-to-end probing over the JSON-lines transport on an in-memory duplex pipe.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

use triton::cache::CacheStrategy;
use triton::codec::{Argument, EncodedValue};
use triton::dispatch::{DispatchOptions, Dispatcher};
use triton::frontend::CalcFrontend;
use triton::locator::{Locator, RecoveryStrategy, Step};
use triton::protocol::{
    ErrorKind, ProbeQuery, RequestEnvelope, ResponseEnvelope, SourceSpec,
};
use triton::transport::serve_lines;

fn new_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("tokio runtime")
}

/// Client end of a JSON-lines session with a served dispatcher.
struct Client {
    writer: DuplexStream,
    responses: Lines<BufReader<DuplexStream>>,
}

impl Client {
    fn connect(dispatcher: Arc<Dispatcher>) -> Self {
        let (client_out, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_in) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            serve_lines(&dispatcher, BufReader::new(server_in), server_out)
                .await
                .expect("serve lines");
        });
        Self { writer: client_out, responses: BufReader::new(client_in).lines() }
    }

    async fn send_raw(&mut self, line: &str) -> ResponseEnvelope {
        self.writer.write_all(line.as_bytes()).await.expect("write");
        self.writer.write_all(b"\n").await.expect("write newline");
        let line = self.responses.next_line().await.expect("read").expect("response line");
        serde_json::from_str(&line).expect("response envelope")
    }

    async fn send(&mut self, request: &RequestEnvelope) -> ResponseEnvelope {
        let line = serde_json::to_string(request).expect("request json");
        self.send_raw(&line).await
    }
}

fn dispatcher() -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(Arc::new(CalcFrontend), DispatchOptions::default()))
}

fn node_ref(value: &EncodedValue) -> &Locator {
    match value {
        EncodedValue::Node { locator, .. } => locator,
        other => panic!("expected node reference, got {other:?}"),
    }
}

#[test]
fn probe_session_walks_the_tree_through_returned_locators() {
    new_runtime().block_on(async {
        let mut client = Client::connect(dispatcher());
        let source = SourceSpec::new("width * 2; width - 1").with_args(["width=20"]);

        let response = client
            .send(&RequestEnvelope {
                id: 1,
                source: source.clone(),
                recovery: None,
                query: ProbeQuery::ListNodes { offset: 11 },
            })
            .await;
        let body = response.body.expect("nodes");
        let innermost = node_ref(&body[0]);
        assert_eq!(innermost.target_type(), Some("Var"));

        let response = client
            .send(&RequestEnvelope::evaluate(2, source.clone(), innermost.clone(), "value", vec![]))
            .await;
        assert_eq!(response.body, Some(vec![EncodedValue::plain("20")]));

        let response = client
            .send(&RequestEnvelope::evaluate(
                3,
                source.clone(),
                innermost.clone(),
                "parent",
                vec![],
            ))
            .await;
        let body = response.body.expect("parent");
        let sub = node_ref(&body[0]).clone();
        assert_eq!(sub.target_type(), Some("Sub"));

        let response = client
            .send(&RequestEnvelope::evaluate(4, source, sub, "value", vec![]))
            .await;
        assert_eq!(response.body, Some(vec![EncodedValue::plain("19")]));
        let stats = response.stats.expect("stats");
        assert_eq!(stats.generation, 1);
        assert!(stats.reused_tree);
    });
}

#[test]
fn edits_rebuild_and_recovery_relocates_stale_probes() {
    new_runtime().block_on(async {
        let mut client = Client::connect(dispatcher());
        let before = SourceSpec::new("1 + 2");
        let after = SourceSpec::new("(1 + 2) * 3");

        let response = client
            .send(&RequestEnvelope::evaluate(1, before, Locator::root(), "children", vec![]))
            .await;
        let Some([EncodedValue::Compound { items }]) = response.body.as_deref() else {
            panic!("expected children list, got {response:?}");
        };
        let stmt = node_ref(&items[0]).clone();
        let add = Locator::new(
            stmt.steps().iter().cloned().chain([Step::new("Add", 0)]).collect(),
        );

        let strict = RequestEnvelope::evaluate(2, after.clone(), add.clone(), "value", vec![])
            .with_recovery(RecoveryStrategy::Fail);
        let response = client.send(&strict).await;
        assert_eq!(response.error.expect("stale").kind, ErrorKind::NodeNotFound);

        let lenient = RequestEnvelope::evaluate(3, after, add, "value", vec![])
            .with_recovery(RecoveryStrategy::ChildThenParent);
        let response = client.send(&lenient).await;
        assert_eq!(response.body, Some(vec![EncodedValue::plain("3")]));
        let stats = response.stats.expect("stats");
        assert_eq!(stats.generation, 2);
    });
}

#[test]
fn cache_none_reparses_every_request() {
    new_runtime().block_on(async {
        let mut client = Client::connect(dispatcher());
        let source = SourceSpec::new("6 / 3").with_cache(CacheStrategy::None);
        let mut generations = Vec::new();
        for id in 1..=3 {
            let response = client
                .send(&RequestEnvelope::evaluate(id, source.clone(), Locator::root(), "value", vec![]))
                .await;
            assert_eq!(response.body, Some(vec![EncodedValue::plain("2")]));
            let stats = response.stats.expect("stats");
            assert!(!stats.reused_tree);
            generations.push(stats.generation);
        }
        assert_eq!(generations, [1, 2, 3]);
    });
}

#[test]
fn errors_never_end_the_session() {
    new_runtime().block_on(async {
        let mut client = Client::connect(dispatcher());

        let response = client.send_raw("this is not json").await;
        assert_eq!(response.id, None);
        assert_eq!(response.error.expect("error").kind, ErrorKind::Transport);

        let response = client
            .send(&RequestEnvelope::evaluate(
                2,
                SourceSpec::new("1"),
                Locator::root(),
                "timesTwo",
                vec![Argument::text("twenty-one")],
            ))
            .await;
        let error = response.error.expect("error");
        assert_eq!(error.kind, ErrorKind::Invocation);
        assert!(error.message.contains("must be int"), "{}", error.message);

        let response = client
            .send(&RequestEnvelope::evaluate(
                3,
                SourceSpec::new("1"),
                Locator::root(),
                "timesTwo",
                vec![Argument::int(21)],
            ))
            .await;
        assert_eq!(response.id, Some(3));
        assert_eq!(response.body, Some(vec![EncodedValue::plain("42")]));
    });
}

#[test]
fn two_connections_share_one_cache() {
    new_runtime().block_on(async {
        let dispatcher = dispatcher();
        let mut first = Client::connect(Arc::clone(&dispatcher));
        let mut second = Client::connect(Arc::clone(&dispatcher));
        let source = SourceSpec::new("2 * 21");

        let a = first
            .send(&RequestEnvelope::evaluate(1, source.clone(), Locator::root(), "value", vec![]))
            .await;
        let b = second
            .send(&RequestEnvelope::evaluate(1, source, Locator::root(), "value", vec![]))
            .await;
        assert_eq!(a.body, b.body);
        let (a, b) = (a.stats.expect("stats"), b.stats.expect("stats"));
        assert_eq!(a.generation, b.generation);
        assert!(b.reused_tree);
    });
}
