use std::error::Error;

use ldap3::LdapConnAsync;
use neon::config::{ConnectionConfig, LdapConfig};
use url::Url;

pub const USERS_OU: &str = "ou=users,dc=example,dc=org";

#[must_use]
pub fn ldap_config(page_size: i32) -> LdapConfig {
	LdapConfig {
		url: Url::parse("ldap://localhost:1389").unwrap(),
		bind_dn: "cn=admin,dc=example,dc=org".to_owned(),
		password: "adminpassword".to_owned(),
		users_ou: USERS_OU.to_owned(),
		page_size,
		connection: ConnectionConfig::default(),
	}
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("ou={},dc=example,dc=org", ou),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("ou={},dc=example,dc=org", ou)).await?.success()?;
	Ok(())
}

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind("cn=admin,dc=example,dc=org", "adminpassword").await?;
	Ok(ldap)
}

pub async fn ldap_delete_user(ldap: &mut ldap3::Ldap, uid: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("uid={},{USERS_OU}", uid)).await?.success()?;
	Ok(())
}

pub async fn ldap_add_user(
	ldap: &mut ldap3::Ldap,
	uid: &str,
	uid_number: u32,
	gid_number: u32,
	mail: Option<&str>,
) -> Result<(), Box<dyn Error>> {
	let uid_number = uid_number.to_string();
	let gid_number = gid_number.to_string();
	let home = format!("/home/{uid}");
	let mut attrs = vec![
		("objectClass", ["inetOrgPerson", "posixAccount"].into()),
		("cn", [uid].into()),
		("sn", [uid].into()),
		("uid", [uid].into()),
		("uidNumber", [uid_number.as_str()].into()),
		("gidNumber", [gid_number.as_str()].into()),
		("homeDirectory", [home.as_str()].into()),
	];
	if let Some(mail) = mail {
		attrs.push(("mail", [mail].into()));
	}
	ldap.add(&format!("uid={},{USERS_OU}", uid), attrs).await?.success()?;
	Ok(())
}

/// Remove every user left behind by an earlier run, then the OU itself
pub async fn ldap_reset(ldap: &mut ldap3::Ldap, uids: &[&str]) {
	for uid in uids {
		let _ = ldap_delete_user(ldap, uid).await;
	}
	let _ = ldap_delete_organizational_unit(ldap, "users").await;
}
