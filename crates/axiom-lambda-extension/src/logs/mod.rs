// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Log pipeline: the Logs API pushes batches to [`intake`], events are
//! structured by [`normalizer`], buffered by [`flusher`] and shipped through
//! a [`sink`].

pub mod constants;
pub mod event;
pub mod flusher;
pub mod intake;
pub mod normalizer;
pub mod sink;
