// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Common helpers used in multiple modules.

/// Round `value` up to the next multiple of `alignment`.
pub(crate) const fn align_by(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}
