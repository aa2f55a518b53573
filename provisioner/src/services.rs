//! Bootstrap payload installed on the instance that gets baked into an image.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Shell script run on first boot: update packages, then install, start, and enable httpd.
pub const BOOTSTRAP: &str = r#"#!/bin/bash
sudo su
yum update -y
yum upgrade -y
yum install httpd -y
systemctl start httpd
systemctl enable httpd
chown ec2-user /var/www/*
chown ec2-user /var/www"#;

/// [BOOTSTRAP] encoded as instance user data.
pub fn user_data() -> String {
    BASE64.encode(BOOTSTRAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_data_decodes_to_bootstrap() {
        let decoded = BASE64.decode(user_data()).unwrap();
        assert_eq!(decoded, BOOTSTRAP.as_bytes());
        assert!(BOOTSTRAP.starts_with("#!/bin/bash\n"));
    }
}
