// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use shoprank_core::{RankingError, RetryError};
use shoprank_storage::StoreError;
use thiserror::Error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ranking(#[from] RankingError),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: StoreError },
}

impl From<RetryError<StoreError>> for ServiceError {
    fn from(err: RetryError<StoreError>) -> Self {
        match err {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => ServiceError::RetryExhausted {
                attempts,
                last_error,
            },
            RetryError::Permanent(e) => ServiceError::Store(e),
        }
    }
}
