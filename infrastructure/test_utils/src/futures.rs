// Copyright 2019, The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

/// Poll `$check_expr` until it equals `$expect`, sleeping for `$interval` between attempts. Panics after
/// `$max_attempts`.
///
/// Requires the `tokio` runtime (with the `time` feature) in the calling crate and should be used in an async context.
///
/// ```edition2018
/// # use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
/// # use tari_test_utils::async_assert_eventually;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let counter = Arc::new(AtomicUsize::new(0));
/// let task_counter = counter.clone();
/// tokio::spawn(async move {
///     task_counter.fetch_add(1, Ordering::SeqCst);
/// });
/// async_assert_eventually!(counter.load(Ordering::SeqCst), expect = 1);
/// # }
/// ```
#[macro_export]
macro_rules! async_assert_eventually {
    ($check_expr:expr, expect = $expect:expr, max_attempts = $max_attempts:expr, interval = $interval:expr $(,)?) => {{
        let mut attempts = 0;
        let mut value = $check_expr;
        while value != $expect {
            attempts += 1;
            if attempts > $max_attempts {
                panic!(
                    "assert_eventually assertion failed. Expression did not equal value after {} attempts. Got {:?}, \
                     expected {:?}",
                    $max_attempts, value, $expect
                );
            }
            tokio::time::sleep($interval).await;
            value = $check_expr;
        }
    }};
    ($check_expr:expr, expect = $expect:expr $(,)?) => {{
        $crate::async_assert_eventually!(
            $check_expr,
            expect = $expect,
            max_attempts = 20,
            interval = std::time::Duration::from_millis(100)
        );
    }};
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn it_waits_for_the_expression_to_match() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = counter.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                task_counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        async_assert_eventually!(
            counter.load(Ordering::SeqCst),
            expect = 3,
            max_attempts = 100,
            interval = Duration::from_millis(5),
        );
    }

    #[tokio::test]
    #[should_panic(expected = "assert_eventually assertion failed")]
    async fn it_panics_after_max_attempts() {
        async_assert_eventually!(1u8, expect = 2u8, max_attempts = 2, interval = Duration::from_millis(1));
    }
}
