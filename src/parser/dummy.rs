// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A scripted parser for tests: each call to `parse` consumes the next step of a script, and
//! every call is recorded.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use bytes::Bytes;

use crate::parser::BitstreamParser;
use crate::parser::ParseStatus;
use crate::parser::ParserError;
use crate::parser::ParserKind;
use crate::parser::ParserLibrary;
use crate::parser::ParserResult;

pub(crate) enum Step<D> {
    /// The buffer is consumed. The data, if any, is what the parser has accumulated so far and
    /// what a query would return.
    NeedMoreData(Option<D>),
    /// The buffer completes a frame described by the data.
    Complete(D),
    /// The buffer is rejected.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParserCall {
    Open(ParserKind),
    Parse { data: Bytes, is_header: bool },
    Query,
    Flush,
    Close,
}

pub(crate) struct Script<D> {
    header: Option<D>,
    steps: VecDeque<Step<D>>,
    pending: Option<D>,
    /// Makes the next flush fail.
    pub fail_flush: bool,
    pub calls: Vec<ParserCall>,
}

impl<D> Script<D> {
    /// Number of non-header parse calls made so far.
    pub(crate) fn num_parsed(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ParserCall::Parse { is_header: false, .. }))
            .count()
    }
}

/// Shared handle to a script, also acting as the parser library.
pub(crate) struct Library<D> {
    script: Arc<Mutex<Script<D>>>,
}

impl<D> Clone for Library<D> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
        }
    }
}

impl<D> Library<D> {
    /// `header` is returned by the query following the parsing of the codec header.
    pub(crate) fn new(header: Option<D>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                header,
                steps: Default::default(),
                pending: None,
                fail_flush: false,
                calls: vec![],
            })),
        }
    }

    pub(crate) fn script(&self) -> MutexGuard<'_, Script<D>> {
        self.script.lock().unwrap()
    }

    pub(crate) fn push(&self, step: Step<D>) {
        self.script().steps.push_back(step);
    }

    pub(crate) fn calls(&self) -> Vec<ParserCall> {
        self.script().calls.clone()
    }
}

impl<D: Clone + Send + 'static> ParserLibrary<D> for Library<D> {
    fn open(&self, kind: ParserKind) -> ParserResult<Box<dyn BitstreamParser<D>>> {
        self.script().calls.push(ParserCall::Open(kind));
        Ok(Box::new(Parser {
            script: Arc::clone(&self.script),
        }))
    }
}

struct Parser<D> {
    script: Arc<Mutex<Script<D>>>,
}

impl<D: Clone + Send> BitstreamParser<D> for Parser<D> {
    fn parse(&mut self, data: &Bytes, is_header: bool) -> ParserResult<ParseStatus> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(ParserCall::Parse {
            data: data.clone(),
            is_header,
        });

        if is_header {
            script.pending = script.header.clone();
            return match script.pending {
                Some(_) => Ok(ParseStatus::FrameComplete),
                None => Err(ParserError::Rejected(1)),
            };
        }

        match script.steps.pop_front() {
            Some(Step::NeedMoreData(data)) => {
                script.pending = data;
                Ok(ParseStatus::NeedMoreData)
            }
            Some(Step::Complete(data)) => {
                script.pending = Some(data);
                Ok(ParseStatus::FrameComplete)
            }
            Some(Step::Error) => Err(ParserError::Rejected(2)),
            None => panic!("parser script exhausted"),
        }
    }

    fn query(&mut self) -> ParserResult<D> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(ParserCall::Query);
        script.pending.take().ok_or(ParserError::NoData)
    }

    fn flush(&mut self) -> ParserResult<()> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(ParserCall::Flush);
        script.pending = None;
        if std::mem::take(&mut script.fail_flush) {
            return Err(ParserError::Rejected(3));
        }
        Ok(())
    }

    fn close(&mut self) -> ParserResult<()> {
        self.script.lock().unwrap().calls.push(ParserCall::Close);
        Ok(())
    }
}
