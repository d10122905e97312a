// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod coordinator;
pub mod runtime_done;
