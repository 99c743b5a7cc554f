// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::VecDeque;

use crate::pta::Invocation;
use crate::vm::handles::ClassHdl;
use crate::vm::image::VmImage;

pub mod call_expander;
pub mod pag_builder;

/// Queues the class initialiser of `class`, if any, for analysis under
/// no context.
pub(crate) fn enqueue_clinit(
    image: &VmImage,
    invoc_queue: &mut VecDeque<Invocation>,
    class: ClassHdl,
) {
    if let Some(class_def) = image.find_class(class) {
        if let Some(clinit) = class_def.clinit {
            invoc_queue.push_back(Invocation::new(None, clinit));
        }
    }
}
