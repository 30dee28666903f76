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

use mail_submit::{AuthStrategy, DialerTarget, Envelope, Error, SendSession, TlsConfig};

#[tokio::main]
async fn main() {
    env_logger::init();

    let envelope = Envelope::new("Howdy!", "Hello world!")
        .from("john@example.com")
        .to("jane@example.com")
        .bcc("archive@example.com");

    // Connect to a relay that trusts this host, then upgrade to TLS
    // before sending.
    let strategy = AuthStrategy::dialer(DialerTarget::new("relay.example.com", "25"))
        .await
        .unwrap();

    match SendSession::new(strategy)
        .send_mail_tls(&envelope, &TlsConfig::new())
        .await
    {
        Ok(()) => println!("Message sent"),
        Err(Error::RejectedRecipients {
            rejected,
            delivered,
        }) => {
            for rcpt in rejected {
                println!("{} rejected: {} {}", rcpt.address, rcpt.code, rcpt.message);
            }
            println!("Delivered to the remaining recipients: {delivered}");
        }
        Err(err) => panic!("Send failed: {err}"),
    }
}
