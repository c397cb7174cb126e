// Copyright 2025 mobile_rag_engine contributors
// SPDX-License-Identifier: MIT

pub mod api;
