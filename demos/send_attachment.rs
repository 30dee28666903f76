/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use mail_submit::{AuthStrategy, Credentials, Envelope, SendSession};

#[tokio::main]
async fn main() {
    env_logger::init();

    // Build a message with a single attachment
    let mut envelope = Envelope::new("Hi!", "These pretzels are making me thirsty.")
        .from("john@example.com")
        .to("jane@example.com")
        .cc("james@example.com");
    envelope.attach("pretzels.txt", b"Salted, twisted and baked.".to_vec());

    // Dial the submission port, upgrade to TLS when offered and
    // authenticate using the provided credentials.
    let strategy = AuthStrategy::plain_auth(Credentials::new(
        "john@example.com",
        "p4ssw0rd",
        "smtp.example.com",
        "587",
    ));

    SendSession::new(strategy)
        .send_mail(&envelope)
        .await
        .unwrap();
}
