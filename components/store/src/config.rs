// Copyright 2024 grist
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq)]
pub struct StoreConfig {
    /// `<kind>://:<address>`, for example `memory://:grist`.
    pub dsn:                String,
    /// Records per round trip when a query leaves its batch size at 0.
    pub default_batch_size: u32,
}

impl StoreConfig {
    pub fn with_dsn(&mut self, dsn: &str) -> &mut Self {
        self.dsn = dsn.to_string();
        self
    }

    pub fn with_default_batch_size(&mut self, batch_size: u32) -> &mut Self {
        self.default_batch_size = batch_size;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn:                grist_common::GRIST_DEBUG_STORE_ADDR.to_string(),
            default_batch_size: grist_common::DEFAULT_BACKEND_BATCH_SIZE,
        }
    }
}
